pub mod probe;
pub mod relay;
pub mod tor;
pub mod torrc_peer;
