//! Use cases - room session orchestration.
//!
//! `discussion` walks authored steps without I/O; `game_state` applies what
//! it reports to the room.

pub mod discussion;
pub mod game_state;
