// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Supervision of the acceptor worker.
//!
//! Acceptors fail on purpose (see [FaultConfig](crate::config::FaultConfig)). When one
//! does, all of its state is dropped along with its queue, and after a fixed recovery
//! delay a new worker is started from scratch.
use super::acceptor::{Acceptor, Exit, Health, Inbound};

use log::{error, info, warn};
use std::sync::Arc;
use tokio::{
    select,
    sync::{mpsc, watch},
    task,
    time::sleep,
};

/// Keep `acceptor` running until `shutdown` fires, starting with a worker over `rx`.
pub(crate) async fn supervise(
    acceptor: Arc<Acceptor>,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        acceptor.set_health(Health::Running);

        let mut worker = task::spawn(Arc::clone(&acceptor).run(rx));

        let exit = select! {
            exit = &mut worker => exit,
            _ = shutdown.changed() => {
                worker.abort();
                acceptor.close().await;
                acceptor.set_health(Health::Crashed);
                info!("acceptor {} stopped", acceptor.id());
                return;
            }
        };

        acceptor.close().await;
        acceptor.set_health(Health::Crashed);

        match exit {
            Ok(Exit::Crashed) => warn!("acceptor {} is down", acceptor.id()),
            Ok(Exit::Closed) => warn!("acceptor {} queue closed unexpectedly", acceptor.id()),
            Err(e) => error!("acceptor {} panicked: {}", acceptor.id(), e),
        }

        acceptor.set_health(Health::Recovering);

        select! {
            _ = sleep(acceptor.faults().recovery_delay) => {}
            _ = shutdown.changed() => return,
        }

        rx = acceptor.open().await;
        warn!("acceptor {} restarted after failure", acceptor.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FaultConfig,
        paxos::{messenger::Messenger, Message, NodeId, Prepare, ProposalId},
        transport::{Transport, TransportError},
    };
    use std::time::Duration;
    use tokio::{sync::Mutex, time::timeout};

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<Message>>,
    }

    #[crate::async_trait]
    impl Transport for Sink {
        async fn deliver(&self, _: NodeId, msg: Message) -> Result<(), TransportError> {
            self.sent.lock().await.push(msg);
            Ok(())
        }
    }

    fn acceptor(faults: FaultConfig) -> (Arc<Acceptor>, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        let m = Messenger::new(sink.clone(), vec![0].into(), Duration::from_secs(1));
        (Arc::new(Acceptor::new(0, Arc::new(m), faults)), sink)
    }

    fn quick() -> FaultConfig {
        FaultConfig {
            min_window: Duration::from_millis(5),
            max_window: Duration::from_millis(10),
            crash_probability: 0.0,
            recovery_delay: Duration::from_millis(20),
        }
    }

    async fn wait_for(rx: &mut watch::Receiver<Health>, want: Health) {
        timeout(Duration::from_secs(1), async {
            while *rx.borrow() != want {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    fn prepare() -> Inbound {
        Inbound::Message(Message::Prepare(Prepare {
            id: ProposalId::new(1024, 0),
            key: "k".into(),
        }))
    }

    #[tokio::test]
    async fn crashed_acceptors_restart_with_no_memory() {
        let (acc, sink) = acceptor(quick());
        let mut health = acc.watch_health();
        let (stop, stopped) = watch::channel(false);
        let rx = acc.open().await;
        let sup = task::spawn(supervise(Arc::clone(&acc), rx, stopped));

        wait_for(&mut health, Health::Running).await;
        acc.enqueue(prepare()).await;
        acc.enqueue(prepare()).await;
        acc.enqueue(Inbound::Crash).await;

        wait_for(&mut health, Health::Recovering).await;
        // work sent while down is dropped
        acc.enqueue(prepare()).await;

        wait_for(&mut health, Health::Running).await;
        acc.enqueue(prepare()).await;
        sleep(Duration::from_millis(20)).await;

        // one promise before the crash, and one after: the restarted worker has forgotten
        // that it already promised this round
        assert_eq!(2, sink.sent.lock().await.len());

        stop.send(true).unwrap();
        sup.await.unwrap();
        assert_eq!(Health::Crashed, acc.health());
    }

    #[tokio::test]
    async fn random_failures_are_recovered() {
        let (acc, _) = acceptor(FaultConfig {
            crash_probability: 1.0,
            ..quick()
        });
        let mut health = acc.watch_health();
        let (stop, stopped) = watch::channel(false);
        let rx = acc.open().await;
        let sup = task::spawn(supervise(Arc::clone(&acc), rx, stopped));

        for _ in 0..3 {
            wait_for(&mut health, Health::Running).await;
            wait_for(&mut health, Health::Recovering).await;
        }

        stop.send(true).unwrap();
        sup.await.unwrap();
    }
}
