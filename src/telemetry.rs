use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls the filter (default `info`); `LOG_FORMAT=json` emits
/// one JSON object per event.
pub fn init() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    init_with(json);
}

/// Install the subscriber with an explicit output format. Returns whether
/// this call installed it; later calls keep the first subscriber.
pub fn init_with(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_first_subscriber() {
        // No other test in this crate installs a subscriber.
        assert!(init_with(true));
        tracing::info!(format = "json", "subscriber installed");

        assert!(!init_with(false));
        assert!(!init_with(true));
        init();
    }
}
