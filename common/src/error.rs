use thiserror::Error;

use crate::task::TaskId;

/// Errores del núcleo: resolución de fechas, despacho, store y consultas.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// El due-spec no pasa la validación de calendario o le faltan los segundos.
    #[error("invalid date spec: {0}")]
    InvalidDateSpec(String),

    /// El broker no acepta trabajos en este momento.
    #[error("dispatch unavailable: {0}")]
    DispatchUnavailable(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// No se pudo leer/escribir el store de registros.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Estado interno roto (p.ej. un lock envenenado). Reintentar no ayuda.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Nombre estable del tipo de error (se usa en las respuestas HTTP).
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::InvalidDateSpec(_) => "InvalidDateSpec",
            TaskError::DispatchUnavailable(_) => "DispatchUnavailable",
            TaskError::NotFound(_) => "NotFound",
            TaskError::StoreUnavailable(_) => "StoreUnavailable",
            TaskError::Internal(_) => "Internal",
        }
    }

    /// Solo los errores de backend transitorios tienen sentido reintentarlos.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::DispatchUnavailable(_) | TaskError::StoreUnavailable(_)
        )
    }
}

/// Errores al leer la configuración desde variables de entorno.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: zona horaria desconocida '{value}'")]
    UnknownTimezone { var: &'static str, value: String },

    #[error("{var}: valor inválido '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
