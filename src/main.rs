use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use silica::cli::{Cli, Command};
use silica::config::Settings;
use silica::forms::{FormError, PostedData, SilicaForm};
use silica::persistence::{RecordFilter, RecordStore, SqlxRecordStore};
use std::io::Read;
use std::path::Path;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    info!(forms = settings.forms.len(), "configuration loaded");

    match &cli.command {
        Command::Schema { form } => {
            let definition = settings
                .form(form)
                .with_context(|| format!("unknown form '{}'", form))?;
            let form = SilicaForm::new(definition.clone(), &settings.arrays)?;
            print_json(&json!({
                "schema": form.data_schema(),
                "uischema": form.ui_schema()?,
            }))?;
        }
        Command::Submit {
            form,
            data,
            instance,
            urlencoded,
        } => {
            let definition = settings
                .form(form)
                .with_context(|| format!("unknown form '{}'", form))?
                .clone();
            let store = SqlxRecordStore::connect(&settings.persistence).await?;

            let body = read_body(data)?;
            let posted = if *urlencoded {
                PostedData::from_urlencoded(body.trim())?
            } else {
                let value: Value =
                    serde_json::from_str(&body).context("posted data is not valid JSON")?;
                PostedData::from_json(&value)?
            };

            let mut silica_form = SilicaForm::new(definition.clone(), &settings.arrays)?;
            if let Some(id) = instance {
                let collection = definition
                    .model
                    .as_deref()
                    .with_context(|| format!("form '{}' is not bound to a collection", form))?;
                let record = store
                    .query(&RecordFilter::new(collection))
                    .await?
                    .into_iter()
                    .find(|record| record.id.as_str() == id)
                    .with_context(|| format!("no record '{}' in '{}'", id, collection))?;
                silica_form = silica_form.with_instance(record);
            }

            match silica_form.submit(&store, posted).await {
                Ok(submission) => print_json(&serde_json::to_value(&submission)?)?,
                Err(FormError::Invalid { fields, arrays, .. }) => {
                    print_json(&json!({ "fields": fields, "arrays": arrays }))?;
                    store.close().await;
                    anyhow::bail!("form '{}' is invalid", form);
                }
                Err(e) => {
                    store.close().await;
                    return Err(e.into());
                }
            }
            store.close().await;
        }
        Command::Records { collection } => {
            let store = SqlxRecordStore::connect(&settings.persistence).await?;
            let records = store.query(&RecordFilter::new(collection)).await?;
            print_json(&serde_json::to_value(&records)?)?;
            store.close().await;
        }
        Command::Migrate => {
            let mut persistence = settings.persistence.clone();
            persistence.auto_migrate = false;
            let store = SqlxRecordStore::connect(&persistence).await?;
            let result = store.migrate().await?;
            info!(
                applied = result.applied,
                skipped = result.skipped,
                "migrations complete"
            );
            print_json(&serde_json::to_value(store.migration_status().await?)?)?;
            store.close().await;
        }
    }

    Ok(())
}

fn read_body(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read posted data from stdin")?;
        Ok(body)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read posted data from {}", path.display()))
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
