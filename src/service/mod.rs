pub mod game_session;
pub mod registry;
pub mod router;
pub mod socket;
