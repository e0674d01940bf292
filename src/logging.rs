use {
    anyhow::Result,
    std::{
        fs::File,
        path::Path,
        sync::Arc,
    },
    tracing::Level,
    tracing_subscriber::{
        fmt::{
            layer,
            writer::MakeWriterExt,
        },
        layer::SubscriberExt,
        util::SubscriberInitExt,
    },
};

/// Install the global tracing subscriber: a compact stdout layer, plus an
/// ANSI-free file layer when `log_file` is given.
///
/// Call once from the embedding binary before training starts.
pub fn init_tracing(
    log_file: Option<&Path>,
    min_level: Level,
) -> Result<()> {
    let registry = tracing_subscriber::registry().with(
        layer()
            .with_writer(std::io::stdout.with_max_level(min_level))
            .compact()
            .with_target(false),
    );

    match log_file {
        Some(path) => {
            let file = Arc::new(File::create(path)?);
            registry
                .with(
                    layer()
                        .with_writer(file.with_max_level(min_level))
                        .with_ansi(false),
                )
                .init();
        }
        None => registry.init(),
    }

    Ok(())
}
