//! Classroom Arcade engine library.
//!
//! ## Structure
//!
//! - `games/` - Per-game stage lists and keyword hooks
//! - `use_cases/` - Discussion interpreter and game state orchestration
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `runner` - Poll/event loop driving one session
//! - `app` - Application composition

pub mod app;
pub mod games;
pub mod infrastructure;
pub mod runner;
pub mod use_cases;

pub use app::App;
