pub mod ball;
pub mod config;
pub mod demo_feed;
pub mod error;
pub mod gateway;
pub mod history;
pub mod innings;
pub mod logging;
pub mod match_state;
pub mod notify;
pub mod over;
pub mod persist;
pub mod scoreboard;
pub mod scorer;
pub mod spectator;
pub mod state;
pub mod toss;
pub mod worker;
