//! Subcommand implementations, kept out of `main` so they can be tested.

use std::future::Future;
use std::sync::Arc;

use sdn_policy::{
    check_stratification, FlowRule, PolicyCompiler, PolicyError, Role, RuleInstaller, SwitchId,
};
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::SdnctlConfig;
use crate::daemon::{ConnectionReport, ControllerDaemon, DaemonConfig};
use crate::error::Result;
use crate::events::forward_events;

/// Outcome of compiling one configured switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCheck {
    pub dpid: SwitchId,
    pub role: Role,
    pub rules: usize,
    pub error: Option<PolicyError>,
}

impl SwitchCheck {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Compile the policy of one switch.
pub fn compile(config: &SdnctlConfig, dpid: SwitchId) -> Result<(Role, Vec<FlowRule>)> {
    config.validate()?;
    let topology = Arc::new(config.topology()?);
    let compiler = PolicyCompiler::new(topology);
    Ok(compiler.compile_switch(dpid)?)
}

/// Validate the configuration and compile every configured switch.
///
/// A broken topology fails the whole check; a broken policy only marks the
/// switches that use it.
pub fn check(config: &SdnctlConfig) -> Result<Vec<SwitchCheck>> {
    config.validate()?;
    let topology = Arc::new(config.topology()?);
    let compiler = PolicyCompiler::new(Arc::clone(&topology));

    let results = topology
        .roles()
        .iter()
        .map(|(dpid, role)| {
            let compiled = compiler
                .compile(role)
                .and_then(|rules| check_stratification(&rules).map(|_| rules.len()));
            match compiled {
                Ok(rules) => SwitchCheck {
                    dpid,
                    role,
                    rules,
                    error: None,
                },
                Err(e) => SwitchCheck {
                    dpid,
                    role,
                    rules: 0,
                    error: Some(e),
                },
            }
        })
        .collect();

    Ok(results)
}

/// Feed an event stream through a controller until the stream ends or
/// `shutdown` completes.
pub async fn serve<R, F>(
    config: &SdnctlConfig,
    reader: R,
    installer: Arc<dyn RuleInstaller>,
    shutdown: F,
) -> Result<Vec<ConnectionReport>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let controller = config.build_controller(installer)?;
    let capacity = config.controller.channel_capacity;
    let daemon = ControllerDaemon::new(
        DaemonConfig {
            channel_capacity: capacity,
        },
        controller,
    );

    let (tx, rx) = mpsc::channel(capacity);
    let forward = forward_events(reader, tx);
    let run = daemon.run(rx, shutdown);
    tokio::pin!(forward, run);

    // The reader may never reach EOF; stop reading once the daemon is done.
    let mut forwarded = None;
    let reports = loop {
        tokio::select! {
            result = &mut forward, if forwarded.is_none() => forwarded = Some(result),
            reports = &mut run => break reports,
        }
    };

    match forwarded.transpose()? {
        Some(events) => info!(events, connections = reports.len(), "Event stream done"),
        None => info!(connections = reports.len(), "Event stream interrupted"),
    }
    Ok(reports)
}

/// Replay a recorded event stream to completion.
pub async fn replay<R>(
    config: &SdnctlConfig,
    reader: R,
    installer: Arc<dyn RuleInstaller>,
) -> Result<Vec<ConnectionReport>>
where
    R: AsyncBufRead + Unpin,
{
    serve(config, reader, installer, std::future::pending()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use pretty_assertions::assert_eq;
    use sdn_policy::RecordingInstaller;

    #[test]
    fn test_compile_core_router() {
        let (role, rules) = compile(&SdnctlConfig::default(), 21).unwrap();
        assert_eq!(role, Role::CoreRouter);
        assert_eq!(rules.len(), 11);
    }

    #[test]
    fn test_compile_unknown_switch() {
        let err = compile(&SdnctlConfig::default(), 99).unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Policy(PolicyError::UnknownSwitch(99))
        ));
    }

    #[test]
    fn test_check_default() {
        let results = check(&SdnctlConfig::default()).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(SwitchCheck::is_ok));
        let core = results.iter().find(|r| r.dpid == 21).unwrap();
        assert_eq!(core.rules, 11);
    }

    #[test]
    fn test_check_reports_per_switch_failure() {
        let mut config = SdnctlConfig::default();
        config.core_router.protected.push("h40".to_string());

        let results = check(&config).unwrap();
        let failed: Vec<_> = results.iter().filter(|r| !r.is_ok()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].dpid, 21);
        assert_eq!(
            failed[0].error,
            Some(PolicyError::UnknownHost("h40".to_string()))
        );
    }

    #[tokio::test]
    async fn test_replay() {
        let events = br#"{"event":"connection_up","conn":1,"dpid":1}
{"event":"arp_request","conn":1,"in_port":3,"sender_mac":"00:00:00:00:01:0a","sender_ip":"10.0.1.10","target_ip":"10.0.4.10"}
{"event":"connection_down","conn":1}
"#;
        let installer = RecordingInstaller::new();
        let reports = replay(
            &SdnctlConfig::default(),
            &events[..],
            Arc::new(installer.clone()),
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].replies, 1);
        assert_eq!(installer.rules_for(1).len(), 2);
        assert_eq!(installer.packets_for(1)[0].out_port, 3);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_with_open_reader() {
        // The writer half stays alive, so the reader never sees EOF.
        let (_writer, reader) = tokio::io::duplex(64);

        let served = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            serve(
                &SdnctlConfig::default(),
                tokio::io::BufReader::new(reader),
                Arc::new(RecordingInstaller::new()),
                async {},
            ),
        )
        .await;

        let reports = served.expect("serve did not return after shutdown").unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_serve_closes_connections_on_shutdown() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(1024);
        writer
            .write_all(b"{\"event\":\"connection_up\",\"conn\":1,\"dpid\":21}\n")
            .await
            .unwrap();

        let installer = RecordingInstaller::new();
        let recorded = installer.clone();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = async move {
            let _ = stop_rx.await;
        };

        let config = SdnctlConfig::default();
        let serving = serve(
            &config,
            tokio::io::BufReader::new(reader),
            Arc::new(installer),
            shutdown,
        );
        let stopper = async move {
            while recorded.rules_for(21).len() < 11 {
                tokio::task::yield_now().await;
            }
            let _ = stop_tx.send(());
        };

        let (served, ()) = tokio::time::timeout(std::time::Duration::from_secs(3), async {
            tokio::join!(serving, stopper)
        })
        .await
        .expect("serve did not return after shutdown");

        let reports = served.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].role, Some(Role::CoreRouter));
        assert_eq!(reports[0].rules_installed, 11);
        drop(writer);
    }

    #[tokio::test]
    async fn test_replay_bad_line() {
        let events = b"{\"event\":\"connection_up\",\"conn\":1,\"dpid\":1}\nnot json\n";
        let result = replay(
            &SdnctlConfig::default(),
            &events[..],
            Arc::new(RecordingInstaller::new()),
        )
        .await;
        assert!(matches!(result, Err(DaemonError::Event { line: 2, .. })));
    }
}
