//! SaludEscolar API JSON to `AgendaSnapshot` converter.
//!
//! The backend exposes the same appointment under different endpoints
//! depending on lifecycle stage, with inconsistent field names, date
//! encodings and status wording. Everything here treats the input as an
//! untyped bag of keys and degrades to a defined default instead of
//! failing: a record never aborts the agenda build.

use std::collections::{hash_map::Entry, HashMap};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use citas_core::{AgendaError, AgendaSnapshot, Appointment, AppointmentStatus};
use regex::Regex;
use serde_json::Value;

/// Placeholder shown when no professional or patient name survives.
pub const UNKNOWN_PROFESSIONAL: &str = "Desconocido";

/// Build an agenda from a JSON document holding the three raw
/// collections under `citas`, `hechas` and `canceladas`. Missing keys
/// are treated as empty collections.
pub fn build_agenda_str(document_json: &str, now: DateTime<Utc>) -> Result<AgendaSnapshot, AgendaError> {
    let value: Value =
        serde_json::from_str(document_json).map_err(|err| AgendaError::Parse(err.to_string()))?;
    build_agenda_value(&value, now)
}

/// Same as [`build_agenda_str`], from an already-parsed `Value`.
pub fn build_agenda_value(document: &Value, now: DateTime<Utc>) -> Result<AgendaSnapshot, AgendaError> {
    let document = document.as_object().ok_or(AgendaError::MissingData)?;
    let collection = |key: &str| {
        document
            .get(key)
            .and_then(Value::as_array)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    };

    Ok(build_agenda(
        collection("citas"),
        collection("hechas"),
        collection("canceladas"),
        now,
    ))
}

/// Normalize, merge and bucket the three source collections.
///
/// Each slice is one endpoint's raw response; a source that failed to
/// load is simply passed in empty. `now` anchors the upcoming/past split.
pub fn build_agenda(
    general: &[Value],
    completed: &[Value],
    cancelled: &[Value],
    now: DateTime<Utc>,
) -> AgendaSnapshot {
    let collections = [general, completed, cancelled]
        .into_iter()
        .map(|raw| raw.iter().map(normalize_record).collect::<Vec<_>>());

    let merged = merge_collections(collections);
    let (upcoming, past) = bucket_appointments(merged, now.date_naive());
    AgendaSnapshot::new(upcoming, past)
}

/// Transform one raw record into a canonical [`Appointment`].
///
/// Total: every field has a defined default, nothing here returns an
/// error or panics on malformed input.
pub fn normalize_record(raw: &Value) -> Appointment {
    let professional_name = extract_professional(raw);
    let (scheduled_at, scheduled_at_raw) = extract_fecha(raw);

    let id = extract_id(raw)
        .unwrap_or_else(|| format!("{scheduled_at_raw}-{professional_name}"));

    Appointment {
        id,
        professional_name,
        professional_role: extract_text(raw, &["rolProfesional", "rol", "especialidad"]),
        kind: extract_text(raw, &["tipo", "type"]),
        motive: extract_text(raw, &["motivo", "asunto", "motive"]),
        scheduled_at,
        scheduled_at_raw,
        status: normalize_estado(raw.get("estado").or_else(|| raw.get("status"))),
        source: raw.clone(),
    }
}

/// Combine normalized records from any number of source collections
/// into one list with each id appearing exactly once.
///
/// When the same id shows up again, the record with the
/// higher-precedence status survives (incoming wins ties) and adopts
/// any field the other copy had and it lacks. The general endpoint may
/// carry a stale status for an appointment the completed or cancelled
/// endpoint already knows is terminal; the rank rule makes the merge
/// idempotent and order-insensitive.
pub fn merge_collections<C>(collections: C) -> Vec<Appointment>
where
    C: IntoIterator,
    C::Item: IntoIterator<Item = Appointment>,
{
    let mut merged: HashMap<String, Appointment> = HashMap::new();

    for collection in collections {
        for cita in collection {
            match merged.entry(cita.id.clone()) {
                Entry::Occupied(mut entry) => {
                    let held = entry.get_mut();
                    if cita.status.rank() >= held.status.rank() {
                        let displaced = std::mem::replace(held, cita);
                        backfill(held, displaced);
                    } else {
                        backfill(held, cita);
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(cita);
                }
            }
        }
    }

    merged.into_values().collect()
}

/// Copy over whatever the kept record is missing from the other copy of
/// the same appointment, so no observed date or name is lost to the
/// rank decision.
fn backfill(kept: &mut Appointment, other: Appointment) {
    if kept.scheduled_at.is_none() {
        kept.scheduled_at = other.scheduled_at;
    }
    if kept.scheduled_at_raw.is_empty() {
        kept.scheduled_at_raw = other.scheduled_at_raw;
    }
    if kept.professional_name == UNKNOWN_PROFESSIONAL
        && other.professional_name != UNKNOWN_PROFESSIONAL
        && !other.professional_name.is_empty()
    {
        kept.professional_name = other.professional_name;
    }
    if kept.professional_role.is_empty() {
        kept.professional_role = other.professional_role;
    }
    if kept.kind.is_empty() {
        kept.kind = other.kind;
    }
    if kept.motive.is_empty() {
        kept.motive = other.motive;
    }
}

/// Partition the merged list for display.
///
/// A record enters `upcoming` only when it has both a resolvable
/// today-or-future date and an active status. Everything else is
/// `past` -- including active records without a parseable date, so the
/// partition is total.
pub fn bucket_appointments(
    citas: Vec<Appointment>,
    today: NaiveDate,
) -> (Vec<Appointment>, Vec<Appointment>) {
    let mut upcoming = Vec::new();
    let mut past = Vec::new();

    for cita in citas {
        let on_or_after_today = cita
            .scheduled_day()
            .map(|day| day >= today)
            .unwrap_or(false);

        if cita.status.is_active() && on_or_after_today {
            upcoming.push(cita);
        } else {
            past.push(cita);
        }
    }

    (upcoming, past)
}

const SCHEDULED_WORDS: [&str; 6] = [
    "programada",
    "programado",
    "agendada",
    "agendado",
    "scheduled",
    "activa",
];

const PENDING_WORDS: [&str; 4] = ["pendiente", "pending", "por confirmar", "en espera"];

const DONE_WORDS: [&str; 11] = [
    "hecha",
    "hecho",
    "completada",
    "completado",
    "realizada",
    "realizado",
    "finalizada",
    "finalizado",
    "atendida",
    "done",
    "completed",
];

const CANCELLED_WORDS: [&str; 7] = [
    "cancelada",
    "cancelado",
    "cancelled",
    "canceled",
    "anulada",
    "anulado",
    "rechazada",
];

const CANCELLED_STEMS: [&str; 2] = ["cancel", "anul"];
const DONE_STEMS: [&str; 5] = ["hech", "complet", "realiz", "atendi", "done"];

/// Map a raw status value to one of the four canonical statuses.
///
/// Total: an absent, unrecognized or malformed value defaults to
/// [`AppointmentStatus::Scheduled`].
pub fn normalize_estado(raw: Option<&Value>) -> AppointmentStatus {
    let Some(value) = raw else {
        return AppointmentStatus::Scheduled;
    };

    if let Some(text) = value.as_str() {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return AppointmentStatus::Scheduled;
        }
        if SCHEDULED_WORDS.contains(&needle.as_str()) {
            return AppointmentStatus::Scheduled;
        }
        if PENDING_WORDS.contains(&needle.as_str()) {
            return AppointmentStatus::Pending;
        }
        if DONE_WORDS.contains(&needle.as_str()) {
            return AppointmentStatus::Done;
        }
        if CANCELLED_WORDS.contains(&needle.as_str()) {
            return AppointmentStatus::Cancelled;
        }
        if let Some(status) = needle.parse::<i64>().ok().and_then(status_from_code) {
            return status;
        }
        if CANCELLED_STEMS.iter().any(|stem| needle.contains(stem)) {
            return AppointmentStatus::Cancelled;
        }
        if DONE_STEMS.iter().any(|stem| needle.contains(stem)) {
            return AppointmentStatus::Done;
        }
        return AppointmentStatus::Scheduled;
    }

    numeric_value(value)
        .and_then(status_from_code)
        .unwrap_or(AppointmentStatus::Scheduled)
}

fn status_from_code(code: i64) -> Option<AppointmentStatus> {
    match code {
        0 => Some(AppointmentStatus::Scheduled),
        1 => Some(AppointmentStatus::Pending),
        2 => Some(AppointmentStatus::Done),
        3 => Some(AppointmentStatus::Cancelled),
        _ => None,
    }
}

fn numeric_value(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)
}

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

static DMY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{4})\b").expect("valid regex"));

/// Interpret an arbitrary raw date representation.
///
/// Ordered rules, first match wins: a server timestamp object
/// (`seconds`/`nanoseconds`, either naming convention), a direct
/// datetime parse, an embedded `YYYY-MM-DD`, then `D/M/YYYY` or
/// `D-M-YYYY` zero-padded into an ISO date. No rule matching means
/// `None`; nothing propagates an error.
pub fn parse_fecha(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(dt) = timestamp_object(value) {
        return Some(dt);
    }

    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    parse_datetime_text(text)
        .or_else(|| embedded_iso_date(text))
        .or_else(|| embedded_dmy_date(text))
}

fn timestamp_object(value: &Value) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    let seconds = obj
        .get("seconds")
        .or_else(|| obj.get("_seconds"))
        .and_then(Value::as_i64)?;
    let nanos = obj
        .get("nanoseconds")
        .or_else(|| obj.get("_nanoseconds"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let millis = seconds * 1000 + nanos / 1_000_000;
    Utc.timestamp_millis_opt(millis).single()
}

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

fn parse_datetime_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

fn embedded_iso_date(text: &str) -> Option<DateTime<Utc>> {
    let captures = ISO_DATE.captures(text)?;
    let year: i32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let day: u32 = captures[3].parse().ok()?;
    midnight_utc(year, month, day)
}

fn embedded_dmy_date(text: &str) -> Option<DateTime<Utc>> {
    let captures = DMY_DATE.captures(text)?;
    let day: u32 = captures[1].parse().ok()?;
    let month: u32 = captures[2].parse().ok()?;
    let year: i32 = captures[3].parse().ok()?;
    midnight_utc(year, month, day)
}

fn midnight_utc(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

const ID_FIELDS: [&str; 3] = ["id", "_id", "_docId"];
const DATE_FIELDS: [&str; 4] = ["fechaHora", "fecha", "date", "createdAt"];
const NESTED_NAME_FIELDS: [&str; 4] = ["nombre", "name", "nombreCompleto", "displayName"];
const FLAT_PROFESSIONAL_FIELDS: [&str; 2] = ["professional", "nombreProfesional"];
const PATIENT_FIELDS: [&str; 2] = ["paciente", "patient"];

fn extract_id(raw: &Value) -> Option<String> {
    for field in ID_FIELDS {
        let Some(value) = raw.get(field) else {
            continue;
        };
        if let Some(text) = non_empty_str(value) {
            return Some(text);
        }
        if let Some(number) = numeric_value(value) {
            return Some(number.to_string());
        }
    }
    None
}

fn extract_fecha(raw: &Value) -> (Option<DateTime<Utc>>, String) {
    let mut parsed = None;
    let mut display = String::new();

    for field in DATE_FIELDS {
        let Some(value) = raw.get(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }

        if parsed.is_none() {
            parsed = parse_fecha(value);
        }

        if display.is_empty() {
            display = match value.as_str() {
                Some(text) => text.trim().to_string(),
                None => parsed
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| value.to_string()),
            };
        }

        if parsed.is_some() && !display.is_empty() {
            break;
        }
    }

    (parsed, display)
}

fn extract_professional(raw: &Value) -> String {
    if let Some(profesional) = raw.get("profesional") {
        if let Some(text) = non_empty_str(profesional) {
            return text;
        }
        if profesional.is_object() {
            for field in NESTED_NAME_FIELDS {
                if let Some(text) = profesional.get(field).and_then(non_empty_str) {
                    return text;
                }
            }
        }
    }

    for field in FLAT_PROFESSIONAL_FIELDS {
        if let Some(text) = raw.get(field).and_then(non_empty_str) {
            return text;
        }
    }

    for field in PATIENT_FIELDS {
        if let Some(text) = raw.get(field).and_then(non_empty_str) {
            return text;
        }
    }

    UNKNOWN_PROFESSIONAL.to_string()
}

fn extract_text(raw: &Value, fields: &[&str]) -> String {
    for field in fields {
        if let Some(text) = raw.get(*field).and_then(non_empty_str) {
            return text;
        }
    }
    String::new()
}

fn non_empty_str(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
