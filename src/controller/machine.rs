//! The recording flow as an explicit finite-state machine.
//!
//! The machine is synchronous and owns no devices or timers; the driver
//! feeds it elapsed time and user actions. The finalize reentrancy guard is
//! the `Finalizing` state itself: whichever trigger (timer expiry or skip)
//! claims the transition out of `Recording` wins, and the loser observes
//! `Finalizing` and does nothing.

use std::time::Duration;

use crate::config::RecordingPolicy;
use crate::error::{Error, Result};
use crate::model::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Identity collection; nothing recorded yet.
    Intro,
    /// Actively recording the question at `index`.
    Recording { index: usize },
    /// Finalize-and-advance claimed for `index`; further triggers no-op.
    Finalizing { index: usize },
    /// Fixed countdown before recording the next question.
    Intermission { next_index: usize },
    /// All questions answered; waiting on the interview finalization call.
    Uploading,
    /// Terminal.
    Complete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intro => write!(f, "intro"),
            Self::Recording { index } => write!(f, "recording[{}]", index),
            Self::Finalizing { index } => write!(f, "finalizing[{}]", index),
            Self::Intermission { next_index } => write!(f, "intermission[{}]", next_index),
            Self::Uploading => write!(f, "uploading"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Why a finalize-and-advance was claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTrigger {
    TimeExpired,
    Skipped,
}

/// A successfully claimed finalize-and-advance. Exactly one is produced per
/// question.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceClaim {
    pub index: usize,
    pub trigger: AdvanceTrigger,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
struct QuestionTiming {
    limit: Duration,
    extension: Duration,
}

pub struct Machine {
    policy: RecordingPolicy,
    timings: Vec<QuestionTiming>,
    phase: Phase,
    elapsed: Duration,
    extension_used: bool,
}

impl Machine {
    pub fn new(policy: RecordingPolicy, questions: &[Question]) -> Self {
        let timings = questions
            .iter()
            .map(|q| QuestionTiming {
                limit: Duration::from_secs(
                    q.time_limit_secs.unwrap_or(policy.default_time_limit_secs),
                ),
                extension: Duration::from_secs(
                    q.extension_secs.unwrap_or(policy.default_extension_secs),
                ),
            })
            .collect();

        Self {
            policy,
            timings,
            phase: Phase::Intro,
            elapsed: Duration::ZERO,
            extension_used: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn question_count(&self) -> usize {
        self.timings.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Base limit, plus the one-time extension once `elaborate` was used.
    pub fn effective_limit(&self) -> Option<Duration> {
        let index = match self.phase {
            Phase::Recording { index } | Phase::Finalizing { index } => index,
            _ => return None,
        };
        let timing = self.timings[index];
        let mut limit = timing.limit;
        if self.extension_used {
            limit += timing.extension;
        }
        Some(limit)
    }

    /// Leave `Intro` for the first unanswered question. An index past the
    /// end means every question already has a response (resume after the
    /// last answer) and goes straight to `Uploading`.
    pub fn begin_at(&mut self, index: usize) -> Result<Phase> {
        if self.phase != Phase::Intro {
            return Err(self.invalid("recording"));
        }
        self.phase = if index >= self.timings.len() {
            Phase::Uploading
        } else {
            self.enter_question(index)
        };
        Ok(self.phase)
    }

    /// Accumulate recording time. Claims the finalize-and-advance when the
    /// effective limit is reached.
    pub fn tick(&mut self, delta: Duration) -> Option<AdvanceClaim> {
        let Phase::Recording { index } = self.phase else {
            return None;
        };
        self.elapsed += delta;
        let limit = self.effective_limit().expect("recording has a limit");
        if self.elapsed >= limit {
            self.phase = Phase::Finalizing { index };
            return Some(AdvanceClaim {
                index,
                trigger: AdvanceTrigger::TimeExpired,
                elapsed: self.elapsed,
            });
        }
        None
    }

    /// Explicit skip. Permitted only after the minimum recording time; a
    /// skip racing a timer expiry that already claimed the transition is a
    /// no-op (`Ok(None)`).
    pub fn skip(&mut self) -> Result<Option<AdvanceClaim>> {
        match self.phase {
            Phase::Recording { index } => {
                if self.elapsed < Duration::from_secs(self.policy.min_skip_secs) {
                    return Err(Error::SkipTooEarly {
                        min_secs: self.policy.min_skip_secs,
                    });
                }
                self.phase = Phase::Finalizing { index };
                Ok(Some(AdvanceClaim {
                    index,
                    trigger: AdvanceTrigger::Skipped,
                    elapsed: self.elapsed,
                }))
            }
            Phase::Finalizing { .. } => Ok(None),
            _ => Err(self.invalid("finalizing")),
        }
    }

    /// One-time per-question extension. Returns false (and changes nothing)
    /// when already used for this question or not recording.
    pub fn elaborate(&mut self) -> bool {
        if !matches!(self.phase, Phase::Recording { .. }) || self.extension_used {
            return false;
        }
        self.extension_used = true;
        true
    }

    /// Called after the finalize body ran for a claimed question. Moves to
    /// `Intermission`, or to `Uploading` when the claimed question was the
    /// last.
    pub fn advance(&mut self) -> Result<Phase> {
        let Phase::Finalizing { index } = self.phase else {
            return Err(self.invalid("intermission"));
        };
        self.phase = if index + 1 >= self.timings.len() {
            Phase::Uploading
        } else {
            Phase::Intermission {
                next_index: index + 1,
            }
        };
        Ok(self.phase)
    }

    /// The intermission countdown finished; begin the next question with a
    /// fresh timer and extension.
    pub fn intermission_elapsed(&mut self) -> Result<usize> {
        let Phase::Intermission { next_index } = self.phase else {
            return Err(self.invalid("recording"));
        };
        self.phase = self.enter_question(next_index);
        Ok(next_index)
    }

    /// Only a successful interview finalization call moves `Uploading` to
    /// `Complete`.
    pub fn complete(&mut self) -> Result<()> {
        if self.phase != Phase::Uploading {
            return Err(self.invalid("complete"));
        }
        self.phase = Phase::Complete;
        Ok(())
    }

    fn enter_question(&mut self, index: usize) -> Phase {
        self.elapsed = Duration::ZERO;
        self.extension_used = false;
        Phase::Recording { index }
    }

    fn invalid(&self, to: &str) -> Error {
        Error::InvalidTransition {
            from: self.phase.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(n: usize) -> Vec<Question> {
        (0..n).map(|i| Question::new(format!("q{}", i))).collect()
    }

    fn machine(n: usize) -> Machine {
        Machine::new(RecordingPolicy::default(), &questions(n))
    }

    #[test]
    fn timer_and_skip_yield_exactly_one_claim() {
        let mut m = machine(2);
        m.begin_at(0).unwrap();

        // Timer reaches the limit and claims the transition.
        let claim = m.tick(Duration::from_secs(120)).unwrap();
        assert_eq!(claim.trigger, AdvanceTrigger::TimeExpired);

        // A racing skip observes Finalizing and is a no-op.
        assert!(m.skip().unwrap().is_none());
        // So is a racing timer tick.
        assert!(m.tick(Duration::from_millis(50)).is_none());

        assert_eq!(m.advance().unwrap(), Phase::Intermission { next_index: 1 });
    }

    #[test]
    fn skip_requires_minimum_elapsed() {
        let mut m = machine(1);
        m.begin_at(0).unwrap();

        m.tick(Duration::from_secs(4));
        assert!(matches!(m.skip(), Err(Error::SkipTooEarly { min_secs: 5 })));

        m.tick(Duration::from_secs(1));
        let claim = m.skip().unwrap().unwrap();
        assert_eq!(claim.trigger, AdvanceTrigger::Skipped);
        assert_eq!(m.advance().unwrap(), Phase::Uploading);
    }

    #[test]
    fn elaborate_extends_once() {
        let mut m = machine(1);
        m.begin_at(0).unwrap();
        assert_eq!(m.effective_limit(), Some(Duration::from_secs(120)));

        assert!(m.elaborate());
        assert_eq!(m.effective_limit(), Some(Duration::from_secs(130)));

        // Second invocation is a no-op.
        assert!(!m.elaborate());
        assert_eq!(m.effective_limit(), Some(Duration::from_secs(130)));

        // Timer only fires at the extended limit.
        assert!(m.tick(Duration::from_secs(125)).is_none());
        assert!(m.tick(Duration::from_secs(5)).is_some());
    }

    #[test]
    fn extension_resets_between_questions() {
        let mut m = machine(2);
        m.begin_at(0).unwrap();
        assert!(m.elaborate());
        m.tick(Duration::from_secs(130)).unwrap();
        m.advance().unwrap();
        m.intermission_elapsed().unwrap();

        assert_eq!(m.phase(), Phase::Recording { index: 1 });
        assert_eq!(m.elapsed(), Duration::ZERO);
        assert!(m.elaborate(), "fresh question gets a fresh extension");
    }

    #[test]
    fn last_question_advances_to_uploading_then_complete() {
        let mut m = machine(1);
        m.begin_at(0).unwrap();
        m.tick(Duration::from_secs(120)).unwrap();
        assert_eq!(m.advance().unwrap(), Phase::Uploading);

        // Skip is meaningless now.
        assert!(m.skip().is_err());

        m.complete().unwrap();
        assert_eq!(m.phase(), Phase::Complete);
    }

    #[test]
    fn resume_past_the_end_goes_to_uploading() {
        let mut m = machine(2);
        assert_eq!(m.begin_at(2).unwrap(), Phase::Uploading);
    }

    #[test]
    fn begin_requires_intro() {
        let mut m = machine(1);
        m.begin_at(0).unwrap();
        assert!(m.begin_at(0).is_err());
    }
}
