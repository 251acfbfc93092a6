use anyhow::{anyhow, bail, Context, Result};
use camstream::platform::native::{HeadlessSink, NativeMediaDevices};
use camstream::{
    CameraSession, DeviceAccess, ImageMime, PhotoCapture, SessionConfig, SessionEvent,
    SessionState,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    camstream::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: camstream-cli <list-devices|snapshot|preview> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args).await,
        "snapshot" => cmd_snapshot(&args).await,
        "preview" => cmd_preview(&args).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

async fn cmd_list_devices(args: &[String]) -> Result<()> {
    let config = SessionConfig::load_or_default();
    let access = DeviceAccess::new(Arc::new(NativeMediaDevices::new()));
    let devices = access.list_devices(&config.constraints).await?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {} ({})", d.id, d.label, d.facing);
        }
    }
    Ok(())
}

async fn cmd_snapshot(args: &[String]) -> Result<()> {
    // snapshot <out.png|out.jpg> [--device <id>]
    let mut output = None;
    let mut device = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--device" => {
                i += 1;
                device = Some(args.get(i).context("--device needs an id")?.clone());
            }
            other => output = Some(other.to_string()),
        }
        i += 1;
    }
    let output = output.context("output path required")?;

    let mut config = SessionConfig::load_or_default();
    config.auto_start = device.is_none();
    let (session, sink) = open_session(config);
    let mut states = session.subscribe();

    session.attach_sink(sink.clone()).await;
    if let Some(id) = &device {
        if !session.select_device(id).await {
            bail!("no camera with id {}", id);
        }
    }

    tokio::time::timeout(
        SNAPSHOT_TIMEOUT,
        states.wait_for(|state| *state == SessionState::Display),
    )
    .await
    .map_err(|_| anyhow!("camera did not start within {:?}", SNAPSHOT_TIMEOUT))??;

    let photo = PhotoCapture::new(sink, ImageMime::from_path(&output));
    let bytes = photo.take_as_bytes()?;
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("failed to write {}", output))?;
    println!("Saved {} ({} bytes)", output, bytes.len());

    session.deactivate().await;
    Ok(())
}

async fn cmd_preview(_args: &[String]) -> Result<()> {
    let (session, sink) = open_session(SessionConfig::load_or_default());
    let mut events = session.events();

    let (stop_tx, mut stop_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install Ctrl+C handler")?;

    let monitor = session.device_monitor();
    if let Err(e) = monitor.start_monitoring().await {
        log::warn!("Hot-plug monitoring unavailable: {}", e);
    }

    session.attach_sink(sink).await;
    println!("Previewing, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            Some(event) = monitor.wait_for_event() => {
                session.handle_device_event(&event).await;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(state)) => {
                    println!("[{}] {}", chrono::Local::now().format("%H:%M:%S%.3f"), state);
                }
                Ok(SessionEvent::DeviceSelected(device)) => {
                    println!("Using {} ({})", device.label, device.id);
                }
                Ok(SessionEvent::Error(e)) => eprintln!("Error: {}", e),
                Ok(_) => {}
                Err(e) => log::debug!("Event stream lagged: {}", e),
            },
        }
    }

    monitor.stop_monitoring().await?;
    session.deactivate().await;
    println!("Stopped");
    Ok(())
}

fn open_session(config: SessionConfig) -> (CameraSession, Arc<HeadlessSink>) {
    let media = Arc::new(NativeMediaDevices::new());
    let sink = Arc::new(HeadlessSink::new(media.clone()));
    let session = CameraSession::builder(media)
        .config(config)
        .on_error(|e| log::error!("Camera error: {}", e))
        .build();
    (session, sink)
}
