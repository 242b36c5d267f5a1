pub mod cleanup;
pub mod drafts;
pub mod media;
pub mod session;
