use tracing::Subscriber;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

/// Installs the global JSON subscriber. `RUST_LOG` (also read from `.env`)
/// wins over `level`; `name` is logged once so multiple recorder processes
/// can be told apart.
pub fn init(name: impl Into<String>, level: impl Into<String>) {
    dotenvy::dotenv().ok();
    let name: String = name.into();

    let subscriber = get_subscriber(level);
    LogTracer::init().expect("Failed to set logger");
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
    tracing::info!(service = %name, "Logger initialised");
}

fn get_subscriber(level: impl Into<String>) -> impl Subscriber {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.into()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    Registry::default().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    )
}
