//! Modbus Field Acquisition Service (acqsrv)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::{SysinfoMemoryProbe, SystemMetrics};
use errors::GatewayResult;
use fieldgate_modbus::modbus::TransactionIdGenerator;
use tracing::{debug, info, warn};

use acqsrv::core::bootstrap::{self, Args};
use acqsrv::runtime::{start_acquisition, RuntimeDeps};
use acqsrv::{
    BatchTracker, ChannelSink, ConnectionPool, FieldTransport, MemoryConfigStore,
    SchedulerContext, SharedNetworkState, StatusBoard, TcpConnector, TcpFieldTransport,
};

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let args = Args::parse();

    let config = match bootstrap::load_configuration(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("acqsrv: {e}");
            std::process::exit(e.exit_code());
        },
    };
    bootstrap::initialize_logging(&args, &config.service.name, &config.logging)?;

    if args.validate {
        bootstrap::validate_configuration(&config);
        return Ok(());
    }

    let metrics = SystemMetrics::collect();
    info!(
        "Starting {} v{}: {} device(s), {} register(s), {} MB free",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.devices.len(),
        config.register_count(),
        metrics.memory_available_mb
    );

    let pool = Arc::new(ConnectionPool::new(
        config.pool.clone(),
        TcpConnector,
        Arc::new(SysinfoMemoryProbe),
    ));
    let transport: Arc<dyn FieldTransport> = Arc::new(TcpFieldTransport::new(
        Arc::clone(&pool),
        Arc::new(TransactionIdGenerator::new()),
    ));

    let (sink, mut points) = ChannelSink::new(config.sink.queue_capacity);
    let ctx = SchedulerContext {
        store: Arc::new(MemoryConfigStore::from_devices(config.devices.clone())),
        batch: Arc::new(BatchTracker::new()),
        status: Arc::new(StatusBoard::new()),
        sink: Arc::new(sink),
        network: Some(Arc::new(SharedNetworkState::default())),
    };
    let status = Arc::clone(&ctx.status);

    // Downstream publication is outside this service; drain as JSON lines
    let drain = tokio::spawn(async move {
        while let Some(point) = points.recv().await {
            match serde_json::to_string(&point) {
                Ok(line) => debug!("{}", line),
                Err(e) => warn!("{}/{}: {}", point.device_id, point.register_id, e),
            }
        }
    });

    let handles = start_acquisition(RuntimeDeps {
        scheduler: config.scheduler.clone(),
        transports: vec![transport],
        ctx,
        monitor_interval: Duration::from_millis(config.scheduler.tick_interval_ms),
    });

    common::shutdown::cancel_on_shutdown(handles.token.clone()).await;
    handles.shutdown().await;
    drain.abort();

    let flushed = pool.flush().await;
    let stats = pool.stats();
    info!(
        "Pool closed: {} flushed, {} created, {} overflow",
        flushed, stats.created_total, stats.overflow_total
    );
    for (device_id, device) in status.snapshot() {
        info!(
            "  {}: {} ok, {} failed",
            device_id, device.successes, device.failures
        );
    }
    info!("Service shutdown complete");
    Ok(())
}
