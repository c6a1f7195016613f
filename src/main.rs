use anyhow::Context;
use libris_kernel::settings::Settings;

fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load libris settings")?;
    libris_telemetry::init(&settings.telemetry)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(libris_app::run(settings))
}
