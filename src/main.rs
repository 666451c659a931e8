use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use weather_intel::{config::Config, telemetry, BuiltinBackend, ModelTrainer, Parameter, Reading};

async fn read_readings(path: &Path) -> Result<Vec<Reading>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let readings: Vec<Reading> =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing readings in {}", path.display()))?;
    Ok(readings)
}

async fn retrain(trainer: Arc<RwLock<ModelTrainer>>, readings: Vec<Reading>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut trainer = trainer.write();
        let summary = trainer.train_all(&readings);
        if summary.trained_count() > 0 {
            if let Err(e) = trainer.save_all() {
                warn!(error = %e, "saving model bundles failed");
            }
        }
    })
    .await
    .context("training task panicked")?;
    Ok(())
}

/// Train at startup when models are stale; an unreadable readings file
/// leaves the restored models in service.
async fn initial_training(trainer: &Arc<RwLock<ModelTrainer>>, readings_path: &Path) {
    if !trainer.read().needs_retrain(Utc::now()) {
        return;
    }
    match read_readings(readings_path).await {
        Ok(readings) => {
            info!(readings = readings.len(), "initial training");
            if let Err(e) = retrain(trainer.clone(), readings).await {
                warn!(error = %e, "initial training failed");
            }
        }
        Err(e) => warn!(error = %e, "readings unavailable, serving restored models"),
    }
}

fn log_batch_summary(trainer: &ModelTrainer) {
    let batch = trainer.batch_predict_all(&Parameter::batch_defaults());
    for (region, outcomes) in &batch {
        let ready = outcomes.values().filter(|o| o.is_ready()).count();
        info!(%region, ready, total = outcomes.len(), "batch forecast");
        for (parameter, outcome) in outcomes {
            if let Some(err) = outcome.error() {
                warn!(%region, %parameter, kind = ?err.kind, detail = %err.detail, "forecast unavailable");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let trainer = Arc::new(RwLock::new(ModelTrainer::new(&cfg, Arc::new(BuiltinBackend))));

    match trainer.write().load_all() {
        Ok(count) => info!(count, "restored model bundles"),
        Err(e) => info!(error = %e, "no usable model bundles, starting empty"),
    }

    initial_training(&trainer, &cfg.data.readings_path).await;
    log_batch_summary(&trainer.read());

    let every_minutes = cfg.data.retrain_check_minutes.max(1);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(every_minutes * 60));
    interval.tick().await;

    let shutdown = telemetry::shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if !trainer.read().needs_retrain(Utc::now()) {
                    continue;
                }
                match read_readings(&cfg.data.readings_path).await {
                    Ok(readings) => {
                        if let Err(e) = retrain(trainer.clone(), readings).await {
                            warn!(error = %e, "retraining failed");
                        } else {
                            log_batch_summary(&trainer.read());
                        }
                    }
                    Err(e) => warn!(error = %e, "readings unavailable, keeping current models"),
                }
            }
        }
    }

    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_readings_do_not_stop_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.ml.model_registry_path = dir.path().to_path_buf();
        let trainer = Arc::new(RwLock::new(ModelTrainer::new(&cfg, Arc::new(BuiltinBackend))));

        let missing = dir.path().join("absent.json");
        assert!(read_readings(&missing).await.is_err());
        initial_training(&trainer, &missing).await;
        assert!(trainer.read().registry().is_empty());
        assert!(trainer.read().last_training_time().is_none());
    }
}
