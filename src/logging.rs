/// Initializes the `env_logger` backend, reading the level filter from
/// `RUST_LOG` and defaulting to `info` when unset.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
