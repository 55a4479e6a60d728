use clap::Parser;
use tincture::{CliArgs, GpuContext, Session};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("tincture v{}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&args) {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> tincture::Result<()> {
    let project = args.load_project()?;
    let offline = args.headless.is_some() || args.record.is_some() || args.screenshot.is_some();
    if !offline {
        return tincture::run(args.app_config(&project), project);
    }

    let (width, height) = args.preview_size(&project);
    let gpu = GpuContext::headless(width, height)?;
    let mut session = Session::open(&gpu, &project, width, height)?;
    session.run_headless(&gpu, args.headless.unwrap_or(1));

    if let Some(path) = &args.screenshot {
        session.screenshot(&gpu, path)?;
    }
    if let Some(settings) = args.record_settings(&project) {
        let output = session.record(&gpu, &settings)?;
        tracing::info!(output = %output.display(), "done");
    }
    Ok(())
}
