use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ContextConfig;

/// Environment variable naming the log file.
pub const LOG_ENV_VAR: &str = "SOCKETRY_LOG";

/// `RUST_LOG` if set, else this crate at `debug` when commit messages are
/// enabled and at `info` otherwise.
pub fn filter(config: &ContextConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug_messages {
            "socketry=debug"
        } else {
            "socketry=info"
        })
    })
}

/// Plain-text subscriber writing to `writer`.
pub fn subscriber<W>(config: &ContextConfig, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);
    tracing_subscriber::registry()
        .with(filter(config))
        .with(layer)
}

/// Initialize tracing with optional file output.
///
/// Logging is disabled by default: the host usually owns the screen.
/// Set `SOCKETRY_LOG` to a file path to enable it. Apps call this when they
/// are built; a subscriber the host installed first wins.
///
/// Log files get a `{path}.{timestamp}.{pid}` suffix so that several hosts
/// can log side by side.
pub fn init_tracing(config: &ContextConfig) {
    let Some(log_path) = std::env::var(LOG_ENV_VAR).ok() else {
        return;
    };

    let pid = std::process::id();
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let unique_path = format!("{}.{}.{}", log_path, timestamp, pid);

    let Ok(file) = std::fs::File::create(&unique_path) else {
        eprintln!("Warning: Failed to create log file: {}", unique_path);
        return;
    };

    let _ = subscriber(config, file).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, InstanceTools};
    use crate::paths::path_map;
    use crate::{path, Component, Effect, Template};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::io;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn commit_once(config: ContextConfig) {
        let template = Template::builder()
            .name("Flag")
            .socket("flag")
            .action("raise", |_| {
                Effect::now(|mut model| {
                    model.insert("flag".to_string(), json!(true));
                    model
                })
            })
            .build();
        let component: Component<String> =
            Component::new(&template, path_map([("flag", path!["flag"])])).unwrap();
        let context = Context::builder(json!({})).config(config).build();
        let instance = context.create_instance(&component, InstanceTools::default());
        instance.actions().dispatch("raise", &[]).unwrap();
        context.flush();
    }

    fn captured(debug_messages: bool) -> String {
        let config = ContextConfig {
            debug_messages,
            ..ContextConfig::default()
        };
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = subscriber(&config, move || writer.clone());
        tracing::subscriber::with_default(subscriber, || commit_once(config));
        buffer.text()
    }

    #[test]
    fn test_debug_messages_log_commits() {
        let text = captured(true);
        assert!(text.contains("Commit applied"));
        assert!(text.contains("action=raise"));
    }

    #[test]
    fn test_commit_messages_off() {
        assert!(!captured(false).contains("Commit applied"));
    }

    #[test]
    fn test_init_tracing_writes_suffixed_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path().join("socketry.log");
        std::env::set_var(LOG_ENV_VAR, &base);

        init_tracing(&ContextConfig::default());
        tracing::info!("logging initialized");
        std::env::remove_var(LOG_ENV_VAR);

        let created: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(created.len(), 1);
        assert!(created[0].starts_with("socketry.log."));
        assert!(created[0].ends_with(&format!(".{}", std::process::id())));
    }
}
