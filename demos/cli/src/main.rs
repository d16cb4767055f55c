use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use citas_client::{ApiClient, ClientConfig};
use citas_core::Appointment;
use citas_normalize::build_agenda_str;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "citas-cli",
    about = "Construye la agenda de citas desde un archivo JSON o en vivo desde la API."
)]
struct Args {
    /// Archivo JSON con las colecciones citas/hechas/canceladas.
    #[arg(short, long, conflicts_with_all = ["base_url", "user"])]
    input: Option<PathBuf>,

    /// Id del usuario cuya agenda se consulta (modo en vivo).
    #[arg(short, long)]
    user: Option<String>,

    /// Host de la API para el modo en vivo.
    #[arg(long, requires = "user")]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let snapshot = if let Some(input) = &args.input {
        let data = std::fs::read_to_string(input)
            .with_context(|| format!("No se pudo leer el archivo {input:?}"))?;
        build_agenda_str(&data, Utc::now())?
    } else if let Some(user) = &args.user {
        let config = ClientConfig {
            base_url: args
                .base_url
                .clone()
                .unwrap_or_else(|| citas_client::DEFAULT_BASE_URL.to_string()),
            ..ClientConfig::default()
        };
        ApiClient::new(&config).fetch_agenda(user).await
    } else {
        anyhow::bail!("Indica --input o --user");
    };

    println!("Generada: {}", snapshot.generated_at);

    println!("Próximas citas: {}", snapshot.upcoming().len());
    for cita in snapshot.upcoming() {
        println!("  {}", format_cita(cita));
    }

    println!("Citas pasadas: {}", snapshot.past().len());
    for cita in snapshot.past() {
        println!("  {}", format_cita(cita));
    }

    Ok(())
}

fn format_cita(cita: &Appointment) -> String {
    let fecha = cita
        .scheduled_at
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| cita.scheduled_at_raw.clone());

    format!(
        "{fecha} | {} ({:?}) | {}",
        cita.professional_name, cita.status, cita.motive
    )
}
