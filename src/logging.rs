use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Installs the global fmt subscriber. Output goes to stderr so stdout stays
/// free for rendered job state and raw frames.
pub(crate) fn init(verbose: bool) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level_for(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already set in tests
}

fn level_for(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}
