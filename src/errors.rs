use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

#[derive(Debug, Clone)]
pub enum DeeplinkError {
    Validation(String),
    NotFound(String),
    ClassifierTimeout(String),
    StoreUnavailable(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    Serialization(String),
    Config(String),
    InvalidTransition(String),
}

impl DeeplinkError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            DeeplinkError::Validation(_) => "E001",
            DeeplinkError::NotFound(_) => "E002",
            DeeplinkError::ClassifierTimeout(_) => "E003",
            DeeplinkError::StoreUnavailable(_) => "E004",
            DeeplinkError::DatabaseConfig(_) => "E005",
            DeeplinkError::DatabaseConnection(_) => "E006",
            DeeplinkError::Serialization(_) => "E007",
            DeeplinkError::Config(_) => "E008",
            DeeplinkError::InvalidTransition(_) => "E009",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            DeeplinkError::Validation(_) => "Validation Error",
            DeeplinkError::NotFound(_) => "Resource Not Found",
            DeeplinkError::ClassifierTimeout(_) => "Classifier Timeout",
            DeeplinkError::StoreUnavailable(_) => "Event Store Unavailable",
            DeeplinkError::DatabaseConfig(_) => "Database Configuration Error",
            DeeplinkError::DatabaseConnection(_) => "Database Connection Error",
            DeeplinkError::Serialization(_) => "Serialization Error",
            DeeplinkError::Config(_) => "Configuration Error",
            DeeplinkError::InvalidTransition(_) => "Invalid State Transition",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            DeeplinkError::Validation(msg)
            | DeeplinkError::NotFound(msg)
            | DeeplinkError::ClassifierTimeout(msg)
            | DeeplinkError::StoreUnavailable(msg)
            | DeeplinkError::DatabaseConfig(msg)
            | DeeplinkError::DatabaseConnection(msg)
            | DeeplinkError::Serialization(msg)
            | DeeplinkError::Config(msg)
            | DeeplinkError::InvalidTransition(msg) => msg,
        }
    }

    /// 格式化为彩色输出（用于 Server 模式启动失败）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }

    /// Whether the error is a transient storage failure worth retrying later
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            DeeplinkError::StoreUnavailable(_) | DeeplinkError::DatabaseConnection(_)
        )
    }
}

impl fmt::Display for DeeplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for DeeplinkError {}

// 便捷的构造函数
impl DeeplinkError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::NotFound(msg.into())
    }

    pub fn classifier_timeout<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::ClassifierTimeout(msg.into())
    }

    pub fn store_unavailable<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::StoreUnavailable(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::DatabaseConnection(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::Config(msg.into())
    }

    pub fn invalid_transition<T: Into<String>>(msg: T) -> Self {
        DeeplinkError::InvalidTransition(msg.into())
    }
}

impl ResponseError for DeeplinkError {
    fn status_code(&self) -> StatusCode {
        match self {
            DeeplinkError::Validation(_) => StatusCode::BAD_REQUEST,
            DeeplinkError::NotFound(_) => StatusCode::NOT_FOUND,
            DeeplinkError::StoreUnavailable(_) | DeeplinkError::DatabaseConnection(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "code": self.code(),
            "error": self.error_type(),
            "message": self.message(),
        }))
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for DeeplinkError {
    fn from(err: sea_orm::DbErr) -> Self {
        DeeplinkError::StoreUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for DeeplinkError {
    fn from(err: std::io::Error) -> Self {
        DeeplinkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DeeplinkError {
    fn from(err: serde_json::Error) -> Self {
        DeeplinkError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeeplinkError>;
