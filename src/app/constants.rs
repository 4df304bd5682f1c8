pub const DEFAULT_ENTRY_NAME: &str = "[DEFAULT]";
