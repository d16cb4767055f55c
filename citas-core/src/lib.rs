//! Modelo canónico de citas y el particionado de la agenda.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Estado canónico del ciclo de vida de una cita, sea cual sea la
/// redacción usada por la fuente.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Pending,
    Done,
    Cancelled,
}

impl AppointmentStatus {
    /// Orden total de precedencia al fusionar fuentes: los estados
    /// terminales dominan sobre `pending`, y `pending` sobre `scheduled`.
    pub fn rank(self) -> u8 {
        match self {
            AppointmentStatus::Scheduled => 0,
            AppointmentStatus::Pending => 1,
            AppointmentStatus::Done | AppointmentStatus::Cancelled => 2,
        }
    }

    /// Una cita activa todavía puede llegar a ocurrir.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Pending
        )
    }

    /// Estado final: ya no cambia en ciclos posteriores.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Scheduled
    }
}

/// Cita ya normalizada, con todos los campos resueltos a un valor por
/// defecto definido.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// Clave estable de deduplicación, nunca vacía.
    pub id: String,
    pub professional_name: String,
    pub professional_role: String,
    pub kind: String,
    pub motive: String,
    /// Fecha interpretada, o `None` si ninguna regla de parseo aplicó.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Representación textual original, conservada para mostrarla cuando
    /// la fecha no se pudo interpretar.
    pub scheduled_at_raw: String,
    pub status: AppointmentStatus,
    /// Registro crudo tal como llegó de la API, para trazabilidad.
    #[serde(default)]
    pub source: serde_json::Value,
}

impl Default for Appointment {
    fn default() -> Self {
        Self {
            id: String::new(),
            professional_name: String::new(),
            professional_role: String::new(),
            kind: String::new(),
            motive: String::new(),
            scheduled_at: None,
            scheduled_at_raw: String::new(),
            status: AppointmentStatus::default(),
            source: serde_json::Value::Null,
        }
    }
}

impl Appointment {
    /// Inicio del día de la cita, para comparaciones solo-fecha.
    pub fn scheduled_day(&self) -> Option<NaiveDate> {
        self.scheduled_at.map(|dt| dt.date_naive())
    }
}

/// Resultado final de un ciclo de carga: la agenda ya particionada.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgendaSnapshot {
    pub generated_at: DateTime<Utc>,
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
}

impl AgendaSnapshot {
    /// Construye el snapshot a partir de los dos cubos ya clasificados.
    /// Las próximas citas quedan en orden cronológico; las pasadas de la
    /// más reciente a la más antigua, con las citas sin fecha al final.
    pub fn new(mut upcoming: Vec<Appointment>, mut past: Vec<Appointment>) -> Self {
        upcoming.sort_by_key(|cita| (cita.scheduled_at.is_none(), cita.scheduled_at));
        past.sort_by(|a, b| match (a.scheduled_at, b.scheduled_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Self {
            generated_at: Utc::now(),
            upcoming,
            past,
        }
    }

    /// Citas próximas, ordenadas por fecha ascendente.
    pub fn upcoming(&self) -> &[Appointment] {
        &self.upcoming
    }

    /// Citas pasadas, canceladas o hechas.
    pub fn past(&self) -> &[Appointment] {
        &self.past
    }

    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty() && self.past.is_empty()
    }
}

/// Error general al construir la agenda.
#[derive(Debug, thiserror::Error)]
pub enum AgendaError {
    #[error("La respuesta no contiene datos de citas")]
    MissingData,
    #[error("No se pudo leer la respuesta: {0}")]
    Parse(String),
    #[error("Error inesperado: {0}")]
    Other(String),
}

/// Agenda vacía (útil para mocks y estados iniciales).
pub fn empty_snapshot() -> AgendaSnapshot {
    AgendaSnapshot {
        generated_at: Utc::now(),
        upcoming: Vec::new(),
        past: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dated(id: &str, ymd: (i32, u32, u32)) -> Appointment {
        Appointment {
            id: id.to_string(),
            scheduled_at: Utc.with_ymd_and_hms(ymd.0, ymd.1, ymd.2, 10, 0, 0).single(),
            ..Appointment::default()
        }
    }

    #[test]
    fn terminal_states_outrank_active_ones() {
        assert!(AppointmentStatus::Done.rank() > AppointmentStatus::Pending.rank());
        assert!(AppointmentStatus::Cancelled.rank() > AppointmentStatus::Pending.rank());
        assert!(AppointmentStatus::Pending.rank() > AppointmentStatus::Scheduled.rank());
        assert_eq!(
            AppointmentStatus::Done.rank(),
            AppointmentStatus::Cancelled.rank()
        );
    }

    #[test]
    fn active_and_terminal_partition_the_statuses() {
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Done.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn snapshot_orders_upcoming_ascending_and_past_descending() {
        let snapshot = AgendaSnapshot::new(
            vec![dated("b", (2024, 6, 20)), dated("a", (2024, 6, 11))],
            vec![
                Appointment {
                    id: "sin-fecha".to_string(),
                    ..Appointment::default()
                },
                dated("c", (2024, 5, 1)),
                dated("d", (2024, 6, 1)),
            ],
        );

        let upcoming: Vec<&str> = snapshot.upcoming().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(upcoming, ["a", "b"]);

        let past: Vec<&str> = snapshot.past().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(past, ["d", "c", "sin-fecha"]);
    }
}
