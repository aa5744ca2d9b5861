pub mod config;
pub mod dispatch;
pub mod models;
pub mod object_id;
pub mod protocol;
pub mod room;
pub mod server;
pub mod service;
pub mod store;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use object_id::ObjectId;
pub use room::RoomRegistry;
pub use server::Server;
