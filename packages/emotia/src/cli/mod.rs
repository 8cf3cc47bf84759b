pub mod chat;
pub mod contacts;
pub mod login;
pub mod room;

pub use chat::chat_command;
pub use contacts::contacts_command;
pub use login::login_command;
pub use room::room_command;
