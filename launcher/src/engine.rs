use std::future::Future;
use std::path::PathBuf;
use tokio::sync::mpsc;

use ipc::{Kind, Message};

use crate::cli::CommandLineParameters;
use crate::history::record_forwarded;
use crate::identity::ApplicationId;
use crate::listener::InstanceListener;
use crate::signals::ShutdownSignal;

/// Everything the engine receives when the launcher hands over the process.
pub struct EngineContext {
    pub app_id: ApplicationId,
    pub params: CommandLineParameters,
    /// `None` when the forwarding socket could not be bound; the engine then
    /// runs without accepting parameters from later launches.
    pub listener: Option<InstanceListener>,
    pub shutdown: ShutdownSignal,
    pub history_path: PathBuf,
}

/// The engine entry point. It owns the process until it returns.
pub trait Engine {
    type Run: Future<Output = anyhow::Result<()>>;

    fn run(self, ctx: EngineContext) -> Self::Run;
}

impl<F, Fut> Engine for F
where
    F: FnOnce(EngineContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    type Run = Fut;

    fn run(self, ctx: EngineContext) -> Fut {
        self(ctx)
    }
}

/// Default engine: serves the forwarding socket, records what arrives and
/// waits for a shutdown request.
pub async fn host_engine(ctx: EngineContext) -> anyhow::Result<()> {
    let EngineContext {
        app_id,
        params,
        listener,
        mut shutdown,
        history_path,
    } = ctx;

    println!(
        "{} running (configuration: {})",
        crate::ui::version_line(),
        if params.is_default_configuration() {
            "default"
        } else {
            params.configuration_name.as_str()
        }
    );
    log::info!(
        "engine: start app_id={} params={:?}",
        app_id,
        params.param_list()
    );

    let (tx, mut rx) = mpsc::channel::<Message>(32);
    let listener_task = listener
        .map(|l| tokio::spawn(l.run(app_id.clone(), tx.clone(), shutdown.receiver())));
    drop(tx);

    loop {
        tokio::select! {
            _ = shutdown.requested() => break,
            msg = rx.recv() => match msg {
                Some(msg) => {
                    match msg.kind {
                        Kind::Params => log::info!(
                            "engine: {} parameter(s) forwarded by pid={}: {:?}",
                            msg.params.len(),
                            msg.sender_pid,
                            msg.params
                        ),
                        Kind::Activate => log::info!(
                            "engine: activation request from pid={}",
                            msg.sender_pid
                        ),
                    }
                    record_forwarded(&history_path, &msg).await;
                }
                None => {
                    shutdown.requested().await;
                    break;
                }
            },
        }
    }

    log::info!("engine: shutting down");
    if let Some(task) = listener_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("engine: listener stopped with error: {e:?}"),
            Err(e) => log::warn!("engine: listener task failed: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::send_params;
    use crate::history::read_history;
    use crate::identity::derive;
    use std::time::Duration;

    #[tokio::test]
    async fn host_engine_records_forwarded_params_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("e.sock");
        let history = dir.path().join("forwarded.jsonl");
        let id = derive("1000", "");
        let (stop, shutdown) = ShutdownSignal::manual();

        let ctx = EngineContext {
            app_id: id.clone(),
            params: CommandLineParameters::default(),
            listener: Some(InstanceListener::bind(&sock).unwrap()),
            shutdown,
            history_path: history.clone(),
        };
        let engine = tokio::spawn(host_engine.run(ctx));

        send_params(&sock, &id, vec!["x.torrent".to_string()]).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            if let Ok(events) = read_history(&history) {
                if events.len() == 1 {
                    assert_eq!(events[0].params, vec!["x.torrent"]);
                    break;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "forwarded params never recorded");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), engine)
            .await
            .expect("engine stopped")
            .unwrap()
            .unwrap();
        assert!(!sock.exists());
    }

    #[tokio::test]
    async fn engine_without_listener_still_honors_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (stop, shutdown) = ShutdownSignal::manual();
        let ctx = EngineContext {
            app_id: derive("1000", "solo"),
            params: CommandLineParameters::default(),
            listener: None,
            shutdown,
            history_path: dir.path().join("h.jsonl"),
        };
        let engine = tokio::spawn(host_engine(ctx));
        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), engine)
            .await
            .expect("engine stopped")
            .unwrap()
            .unwrap();
    }
}
