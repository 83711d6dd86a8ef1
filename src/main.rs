use std::panic;
use std::sync::Arc;

use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::{pipeline::Pipeline, scheduler::BoxPool, traits::registry::LanguageRegistry};
use crate::grpc::models::runner_server::RunnerServer;
use crate::grpc::services::RunnerServiceImpl;
use crate::native::{isolate::IsolateSandbox, languages::ScriptDirectory};

mod config;
mod constants;
mod core;
mod grpc;
mod native;
#[cfg(test)]
mod stubs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let config = Config::from_env()?;
    tracing::debug!("Configuration: {:?}", config);

    let registry = Arc::new(ScriptDirectory::scan(&config.languages_dir)?);
    tracing::info!("Loaded languages: {:?}", registry.languages());

    let sandbox = Arc::new(IsolateSandbox::new(
        &config.isolate_bin,
        &config.box_data_dir,
        &config.scratch_dir,
    ));
    sandbox.prepare().await?;

    let pool = BoxPool::start(config.max_boxes, sandbox).await?;
    tracing::info!(boxes = pool.size(), "Box pool ready");
    let pipeline = Arc::new(Pipeline::new(pool, registry, &config.scratch_dir));
    let service = RunnerServer::new(RunnerServiceImpl::new(pipeline));

    let addr = config.socket_addr();
    tracing::info!("gRPC server listening on {}", addr);
    Server::builder().add_service(service).serve(addr).await?;

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
