/// Installs a panic hook that reports panics through `tracing` before
/// delegating to the previously installed hook.
///
/// Panics inside spawned tasks would otherwise only reach stderr and bypass
/// the structured log pipeline.
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("thread panicked: {info}");
        previous(info);
    }));
}
