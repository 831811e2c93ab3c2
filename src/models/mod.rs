pub mod account;
pub mod appointment;
pub mod chat;
pub mod enums;
pub mod medical_record;
pub mod review;

pub use account::*;
pub use appointment::*;
pub use chat::*;
pub use medical_record::*;
pub use review::*;
