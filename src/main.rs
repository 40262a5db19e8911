use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use soljudge::config::CliArgs;
use soljudge::judge::Judge;
use soljudge::queue::SubmissionQueue;
use soljudge::web_server::build_server;
use soljudge::worker::worker;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_threads = cli.threads;

    if n_threads == 0 {
        panic!("The number of judge workers must not be 0");
    }

    let config = cli.to_config().expect("Failed to load configuration");

    let judge = Arc::new(Judge::build(&config).expect("Failed to initialize judge"));
    let queue = Arc::new(SubmissionQueue::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_threads {
        workers.spawn(worker(
            i,
            judge.clone(),
            queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let server =
        build_server(config.server, judge, queue).expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
        Some(res_worker) = workers.join_next() => {
            log::error!("A worker terminated unexpectedly: {:?}", res_worker);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Broadcast shutdown signal to workers
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    // 3. Wait until every worker terminates
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                log::error!("Worker handle panicked: {:?}", e);
            } else {
                log::error!("Worker handle finished with error: {:?}", e);
            }
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
