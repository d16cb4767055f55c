//! Refresco periódico de la agenda, con ámbito de pantalla.
//!
//! Un solo ciclo de carga a la vez por feed: un refresco pedido
//! mientras otro está en curso se descarta, no se encola. El re-poll
//! silencioso de intervalo fijo y `refresh_now` pasan por el mismo
//! camino vigilado. Al soltar el handle la tarea se aborta, y el bucle
//! también se detiene solo cuando ya no queda ningún receptor, así un
//! ciclo que termina tarde nunca escribe en una vista ya desmontada.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use citas_core::{empty_snapshot, AgendaSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::ApiClient;

pub struct AgendaFeed {
    trigger: mpsc::Sender<()>,
    in_flight: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AgendaFeed {
    /// Arranca el bucle de refresco. Devuelve el handle de control y el
    /// receptor del que la vista lee los snapshots; el primer ciclo
    /// empieza de inmediato.
    pub fn spawn(
        client: ApiClient,
        user_id: impl Into<String>,
        refresh_interval: Duration,
    ) -> (Self, watch::Receiver<AgendaSnapshot>) {
        let user_id = user_id.into();
        let (snapshot_tx, snapshot_rx) = watch::channel(empty_snapshot());
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&in_flight);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(
                user = %user_id,
                "Feed de agenda iniciado (cada {}s)",
                refresh_interval.as_secs()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    requested = trigger_rx.recv() => {
                        if requested.is_none() {
                            break;
                        }
                    }
                }

                flag.store(true, Ordering::SeqCst);
                let agenda = client.fetch_agenda(&user_id).await;
                flag.store(false, Ordering::SeqCst);

                if snapshot_tx.send(agenda).is_err() {
                    tracing::debug!(user = %user_id, "Feed de agenda sin consumidores, se detiene");
                    break;
                }
            }
        });

        (
            Self {
                trigger: trigger_tx,
                in_flight,
                task,
            },
            snapshot_rx,
        )
    }

    /// Pide un refresco inmediato por el camino vigilado. Devuelve si la
    /// petición fue aceptada; `false` significa que ya había un ciclo en
    /// curso (o uno pendiente) y esta se descartó.
    pub fn refresh_now(&self) -> bool {
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::debug!("Refresco descartado: ya hay un ciclo en curso");
            return false;
        }
        self.trigger.try_send(()).is_ok()
    }

    /// Si hay un ciclo de carga corriendo en este momento.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for AgendaFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;

    fn unreachable_client() -> ApiClient {
        ApiClient::new(&ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            refresh_interval_secs: 3600,
        })
    }

    #[tokio::test]
    async fn publishes_an_empty_agenda_when_every_source_fails() {
        let (feed, mut agenda_rx) =
            AgendaFeed::spawn(unreachable_client(), "est-1", Duration::from_millis(10));

        agenda_rx
            .changed()
            .await
            .expect("el feed cerró antes de publicar");
        assert!(agenda_rx.borrow().is_empty());

        drop(feed);
    }

    #[tokio::test]
    async fn refresh_requests_are_dropped_while_one_is_in_flight() {
        let (feed, _agenda_rx) =
            AgendaFeed::spawn(unreachable_client(), "est-1", Duration::from_secs(3600));

        // En el runtime de un solo hilo la tarea aún no corre, así que
        // la primera petición ocupa el hueco y la segunda lo encuentra
        // tomado.
        assert!(feed.refresh_now());
        assert!(!feed.refresh_now());

        // Una petición que llega en mitad de una carga también se
        // descarta.
        feed.in_flight.store(true, Ordering::SeqCst);
        assert!(!feed.refresh_now());
    }
}
