use mimalloc::MiMalloc;
use std::sync::Arc;
use studydb::{DbSetup, DbTarget, GlobalProperties, RegistryHooks, StudyDbError, Task};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "usage: studydb [status|install|update|unlock|uninstall|open]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = &studydb::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());

    info!(
        command = %command,
        hostname = %cfg.database.hostname,
        database_name = %cfg.database.database_name,
        loglevel = %cfg.basic.loglevel,
        auto_import_dir = %cfg
            .registry
            .auto_import_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );

    let globals = Arc::new(match cfg.basic.global_properties_path.as_ref() {
        Some(path) => GlobalProperties::load(path)?,
        None => GlobalProperties::in_memory(),
    });

    let admission = studydb::admission::spawn(cfg.admission.clone()).await?;
    let registry =
        studydb::registry::spawn(cfg.registry.clone(), globals.clone(), RegistryHooks::new())
            .await?;

    let target = DbTarget::from_config(&cfg.database);
    let mut setup = DbSetup::probe(target, &globals, cfg.registry.busy_timeout()).await;

    let result: Result<(), StudyDbError> = match command.as_str() {
        "status" => Ok(()),
        "install" => {
            let _permit = admission.wait_for_start(Task::new(1.0)).await?;
            setup.install(&globals).await
        }
        "update" => {
            let _permit = admission.wait_for_start(Task::new(1.0)).await?;
            setup.update(&globals).await
        }
        "unlock" => setup.unlock(&globals).await,
        "uninstall" => {
            if let Some(id) = registry.resolve_open(setup.target()).await? {
                registry.close(&id).await?;
            }
            setup.uninstall(&globals).await
        }
        "open" => open_and_report(&registry, &mut setup).await,
        other => {
            eprintln!("unknown command `{other}`\n{USAGE}");
            return Err(format!("unknown command `{other}`").into());
        }
    };

    println!("{}", serde_json::to_string_pretty(setup.status())?);

    registry.close_all().await?;
    if let Err(e) = globals.save() {
        error!(error = %e, "failed to save global properties");
    }

    if let Err(e) = result {
        error!(command = %command, error = %e, "command failed");
        return Err(e.into());
    }
    info!(command = %command, "command finished");
    Ok(())
}

async fn open_and_report(
    registry: &studydb::RegistryHandle,
    setup: &mut DbSetup,
) -> Result<(), StudyDbError> {
    registry.open(setup).await?;
    let Some(id) = setup.id().cloned() else {
        return Err(StudyDbError::UnexpectedError(
            "open succeeded without an identity".to_string(),
        ));
    };

    let now = chrono::Utc::now().to_rfc3339();
    registry
        .set_property(Some(&id), "last_opened", &now)
        .await?;
    registry.sync_properties(&id, false).await?;

    if let Some(reference) = registry.reference_data().await? {
        println!(
            "{id}: {} service types, {} channel bands",
            reference.service_types.len(),
            reference.channel_bands.len()
        );
    }
    Ok(())
}
