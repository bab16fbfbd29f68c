//! Resolución de due-specs parciales ("2019-06-20-15-10-59", "10-59", "59")
//! a un timestamp absoluto en una zona horaria dada.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

use crate::error::TaskError;

const MAX_FIELDS: usize = 6;

/// Due-spec parseado. Solo los segundos son obligatorios; el resto, si falta,
/// se toma de "ahora" al resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSpec {
    pub second: u32,
    pub minute: Option<u32>,
    pub hour: Option<u32>,
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl DueSpec {
    /// Parsea `YYYY-MM-DD-HH-mm-ss` leyendo de derecha a izquierda: el último
    /// campo son los segundos, el anterior los minutos, etc.
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TaskError::InvalidDateSpec(
                "faltan los segundos (campo obligatorio)".to_string(),
            ));
        }

        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() > MAX_FIELDS {
            return Err(TaskError::InvalidDateSpec(format!(
                "demasiados campos ({}), máximo {}",
                parts.len(),
                MAX_FIELDS
            )));
        }

        let mut fields: Vec<u32> = Vec::with_capacity(parts.len());
        for part in parts.iter().rev() {
            let value = part.trim().parse::<u32>().map_err(|_| {
                TaskError::InvalidDateSpec(format!("campo no numérico: '{}'", part))
            })?;
            fields.push(value);
        }

        // fields[0] = segundos, fields[1] = minutos, ..., fields[5] = año
        let year = match fields.get(5) {
            Some(&y) => Some(i32::try_from(y).map_err(|_| {
                TaskError::InvalidDateSpec(format!("año fuera de rango: {}", y))
            })?),
            None => None,
        };

        Ok(Self {
            second: fields[0],
            minute: fields.get(1).copied(),
            hour: fields.get(2).copied(),
            day: fields.get(3).copied(),
            month: fields.get(4).copied(),
            year,
        })
    }

    /// Completa los campos faltantes con `now` y valida el calendario.
    /// No hace conversión de zona: el resultado es un timestamp "naive".
    pub fn resolve_at(&self, now: NaiveDateTime) -> Result<NaiveDateTime, TaskError> {
        let year = self.year.unwrap_or(now.year());
        let month = self.month.unwrap_or(now.month());
        let day = self.day.unwrap_or(now.day());
        let hour = self.hour.unwrap_or(now.hour());
        let minute = self.minute.unwrap_or(now.minute());

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            TaskError::InvalidDateSpec(format!(
                "fecha inexistente: {:04}-{:02}-{:02}",
                year, month, day
            ))
        })?;
        let time = NaiveTime::from_hms_opt(hour, minute, self.second).ok_or_else(|| {
            TaskError::InvalidDateSpec(format!(
                "hora inválida: {:02}:{:02}:{:02}",
                hour, minute, self.second
            ))
        })?;

        Ok(NaiveDateTime::new(date, time))
    }
}

/// "Ahora" como hora local de `tz` (se evalúa en cada llamada).
pub fn now_in(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

/// Parsea y resuelve un due-spec contra el momento actual en `tz`.
pub fn resolve(raw: &str, tz: Tz) -> Result<NaiveDateTime, TaskError> {
    DueSpec::parse(raw)?.resolve_at(now_in(tz))
}

/// Localiza un timestamp naive en `tz`, siempre interpretándolo con el
/// offset de horario estándar:
/// - hora ambigua (cambio hacia atrás) => la segunda ocurrencia;
/// - hora inexistente (salto hacia adelante) => se aplica el offset previo
///   al salto, así 02:30 en un salto 02:00->03:00 queda en 03:30.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, TaskError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(_, latest) => Ok(latest),
        LocalResult::None => {
            // ningún salto conocido dura más de unas horas
            let before = tz
                .offset_from_local_datetime(&(naive - Duration::hours(3)))
                .earliest()
                .ok_or_else(|| {
                    TaskError::InvalidDateSpec(format!(
                        "{} no existe en la zona {}",
                        naive.format("%Y-%m-%d %H:%M:%S"),
                        tz.name()
                    ))
                })?;
            let offset = Duration::seconds(i64::from(before.fix().local_minus_utc()));
            Ok(tz.from_utc_datetime(&(naive - offset)))
        }
    }
}
