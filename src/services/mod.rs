pub mod mailbox;
pub mod transport;
