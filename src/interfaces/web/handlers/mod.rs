pub(super) mod chat;
pub(super) mod jobs;
pub(super) mod sessions;
