//! # Authentication against a challenge-protected portal.
//!
//! - [`ChallengeSolver`] with its [`ChallengeClassifier`] and [`ChallengeSource`] seams
//! - [`LoginSession`], the attempt- and deadline-bounded login state machine over a [`LoginPage`]

mod challenge;
mod session;

pub use challenge::{ChallengeClassifier, ChallengeResult, ChallengeSolver, ChallengeSource};
pub use session::{Credentials, LoginPage, LoginReport, LoginSession, LoginState};
