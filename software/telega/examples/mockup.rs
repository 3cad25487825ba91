//! Run a full acquisition cycle against software-defined devices.
//!
//! Demonstrated here:
//!   * Building a pipeline over the built-in mockup port
//!   * Running the board's initial setting until it reports completion
//!   * Measuring into a labeled session log, then replaying that log
//!   * Collecting GPS coordinates for a fixed time
//!   * Saving the pipeline configuration as JSON

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::unbounded;
use tracing::{info, warn};

use telega::{
    command::STOP_INITIAL_SETTING,
    decoder::decode_log_file,
    link::{MockupPort, Port},
    *,
};

fn main() -> Result<()> {
    let op_dir = std::env::temp_dir().join("telega_mockup");
    std::fs::create_dir_all(&op_dir)?;

    // Board context, logging to the terminal and to op_dir/logs
    let mut ctx = PipelineCtx::new(DeviceKind::Stm);
    ctx.op_name = "mockup_example".to_string();
    ctx.op_dir = op_dir.clone();
    ctx.log_to_file = true;

    // Software board with a listener forwarding everything over a channel
    let (port, _handle) = MockupPort::new(DeviceKind::Stm);
    let port: Box<dyn Port> = Box::new(port);
    let (tx, events) = unbounded();
    let mut board =
        Pipeline::new(ctx.clone(), port).with_listener(Arc::new(ChannelListener::new(tx)));

    // Initial setting runs until the board echoes its completion
    board.start_initial_setting()?;
    loop {
        match events.recv_timeout(Duration::from_secs(2)) {
            Ok(ListenerEvent::CommandEcho(name)) if name == STOP_INITIAL_SETTING => break,
            Ok(_) => {}
            Err(_) => {
                warn!("Board never finished its initial setting");
                break;
            }
        }
    }
    board.stop_initial_setting();

    // Measure for a while
    let log_path = board.start_measuring("walk")?;
    std::thread::sleep(Duration::from_millis(300));
    board.stop_measuring();
    drop(board);

    let records = events
        .try_iter()
        .filter(|e| matches!(e, ListenerEvent::Record(_)))
        .count();
    let replay = decode_log_file(DeviceKind::Stm, &log_path)?;
    info!(
        "Received {records} records; {:?} replays to {} records",
        log_path,
        replay.decoded.len()
    );
    if let Some(Decoded::Record(last)) = replay.decoded.last() {
        for (name, value) in last.iter() {
            info!("  {name} = {value}");
        }
    }

    // GPS module, polled through the latest-value listener
    let mut gps_ctx = ctx.clone();
    gps_ctx.device = DeviceKind::Gps;
    let (gps_port, _gps_handle) = MockupPort::new(DeviceKind::Gps);
    let (listener, latest) = LatestValueListener::new();
    let mut gps =
        Pipeline::new(gps_ctx.clone(), Box::new(gps_port)).with_listener(Arc::new(listener));
    let report = gps.collect_coordinates(Duration::from_millis(500))?;
    info!(
        "Collected {} sentences into {:?}",
        report.collector.sentences, report.log_path
    );
    match latest.latest_sentence().and_then(|s| s.position()) {
        Some(p) => info!("Last fix: {:.5}, {:.5}", p.latitude, p.longitude),
        None => warn!("No position fix received"),
    }

    // Configuration can be stored and reloaded as JSON
    let json = serde_json::to_string_pretty(&gps_ctx).map_err(std::io::Error::other)?;
    std::fs::write(op_dir.join("gps_ctx.json"), json)?;

    Ok(())
}
