/*!
# Ошибки укладки

Единый тип ошибок библиотеки. Ошибки входных данных и валидации
отличаются от ошибок движка/транспорта: первые проваливают запрос,
вторые только логируются координатором.
*/

use thiserror::Error;

/// Результат операций библиотеки
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Сторона ребра, указывающая на неизвестную вершину
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSide {
    From,
    To,
}

impl std::fmt::Display for EdgeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeSide::From => f.write_str("from"),
            EdgeSide::To => f.write_str("to"),
        }
    }
}

/// Ошибки укладки
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("Non-unique vertex key: {0}")]
    DuplicateVertex(String),

    #[error("Duplicate edge {from} -> {to}")]
    DuplicateEdge { from: String, to: String },

    #[error("Unrecognized key on edge, {side}: {key}")]
    UnknownEdgeEndpoint { side: EdgeSide, key: String },

    #[error("Positioned vertices supplied without a previous graph")]
    MissingPreviousGraph,

    #[error("New vertices not connected to the graph: {}", .0.join(", "))]
    Unanchored(Vec<String>),

    #[error("Anchor {0} lost its position during graft")]
    LostAnchor(String),

    #[error("Anchor {0} missing from cohort layout")]
    AnchorNotInGraft(String),

    #[error("Layout validation failed: {0}")]
    Validation(String),

    #[error("Invalid input for phase {phase}: {reason}")]
    InvalidPhase { phase: String, reason: String },

    #[error("Malformed plain output at line {line}: {reason}")]
    MalformedPlain { line: usize, reason: String },

    #[error("Layout engine failed: {0}")]
    Engine(String),

    #[error("Engine returned unknown vertex id {0}")]
    UnmappedVertex(String),

    #[error("Engine returned unknown edge {0}")]
    UnmappedEdge(String),

    #[error("Worker {0} is not accepting jobs")]
    WorkerUnavailable(u64),

    #[error("Layout job cancelled")]
    Cancelled,

    #[error("LayoutManager has been disposed")]
    Disposed,
}

impl LayoutError {
    /// Ошибка самого запроса (входные данные, валидация, граф).
    ///
    /// Такие ошибки отправляются вызывающему как проваленный запрос.
    /// Остальные считаются сбоем движка или транспорта.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            LayoutError::DuplicateVertex(_)
                | LayoutError::DuplicateEdge { .. }
                | LayoutError::UnknownEdgeEndpoint { .. }
                | LayoutError::MissingPreviousGraph
                | LayoutError::Unanchored(_)
                | LayoutError::LostAnchor(_)
                | LayoutError::AnchorNotInGraft(_)
                | LayoutError::Validation(_)
                | LayoutError::InvalidPhase { .. }
        )
    }
}

impl From<std::io::Error> for LayoutError {
    fn from(err: std::io::Error) -> Self {
        LayoutError::Engine(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_classification() {
        assert!(LayoutError::DuplicateVertex("a".into()).is_request_error());
        assert!(LayoutError::Unanchored(vec!["x".into()]).is_request_error());
        assert!(!LayoutError::Engine("boom".into()).is_request_error());
        assert!(!LayoutError::MalformedPlain { line: 1, reason: "x".into() }.is_request_error());
        assert!(!LayoutError::Cancelled.is_request_error());
    }

    #[test]
    fn test_messages_name_the_offender() {
        let err = LayoutError::UnknownEdgeEndpoint { side: EdgeSide::To, key: "ghost".into() };
        assert_eq!(err.to_string(), "Unrecognized key on edge, to: ghost");
        assert_eq!(LayoutError::Disposed.to_string(), "LayoutManager has been disposed");
    }
}
