// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every technical error is mapped to a plain message with a concrete
// suggestion. The web pages that call the service show these texts verbatim,
// so they are written in Chinese to match those pages.

use crate::error::PrintError;

/// Where operators can fetch the converter when it is missing.
pub const CONVERTER_DOWNLOAD_URL: &str = "https://mendelson.org/pdftoprinter.html";

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; resubmitting may succeed.
    Transient,
    /// Someone must fix the setup (printer name, missing tool, paused service).
    ActionRequired,
    /// The request itself is wrong (bad payload, broken PDF).
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    /// Whether resubmitting the same job may succeed. Nothing is retried
    /// automatically; this only guides the caller.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }

    /// Single-line text used as the `message` of a failed `PrintResult`.
    pub fn render(&self) -> String {
        format!("{}。建议：{}", self.message, self.suggestion)
    }
}

/// Convert a `PrintError` into text an operator can act on.
pub fn humanize_error(err: &PrintError) -> HumanError {
    match err {
        // -- Intake --
        PrintError::MissingField(field) => HumanError::new(
            format!("打印失败：未提供 {field}"),
            "检查接口调用参数",
            false,
            Severity::Permanent,
        ),

        PrintError::InvalidArgumentType { .. } => HumanError::new(
            "参数类型错误",
            "请检查接口调用方式",
            false,
            Severity::Permanent,
        ),

        PrintError::MalformedMessage(_) => HumanError::new(
            "数据格式错误",
            "发送 JSON 对象或 getprinterlist 指令",
            false,
            Severity::Permanent,
        ),

        // -- Source --
        PrintError::DownloadFailed { reason, .. } => HumanError::new(
            format!("PDF下载失败：{reason}"),
            "检查网络连接和 PDF 地址是否可访问",
            true,
            Severity::Transient,
        ),

        PrintError::LocalCopyFailed { source, .. } => HumanError::new(
            format!("本地PDF拷贝失败：{source}"),
            "检查文件路径、权限",
            false,
            Severity::ActionRequired,
        ),

        // -- Printer --
        PrintError::UnknownPrinter(name) => HumanError::new(
            format!("打印机名称无效：{name}"),
            "检查打印机连接和名称",
            false,
            Severity::ActionRequired,
        ),

        PrintError::Enumeration(detail) => HumanError::new(
            format!("无法获取打印机列表：{detail}"),
            "检查系统打印服务是否正在运行",
            true,
            Severity::Transient,
        ),

        // -- Admission --
        PrintError::PrintingSuspended => HumanError::new(
            "打印被暂停或禁止",
            "在控制面板中点击“开始打印”后重新提交",
            false,
            Severity::ActionRequired,
        ),

        // -- Execution --
        PrintError::MissingExecutable { path } => {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            HumanError::new(
                format!("缺少 {file}，无法打印"),
                format!("将 {file} 放到本程序同目录。下载地址：{CONVERTER_DOWNLOAD_URL}"),
                false,
                Severity::ActionRequired,
            )
        }

        PrintError::ExecutionTimeout { .. } => HumanError::new(
            "打印超时",
            "检查打印机连接和状态",
            true,
            Severity::Transient,
        ),

        PrintError::LaunchFailed(_) => HumanError::new(
            "打印程序无法执行，可能被杀毒软件拦截",
            "请恢复文件并添加信任",
            true,
            Severity::ActionRequired,
        ),

        PrintError::CorruptInput { .. } => HumanError::new(
            "PDF文件损坏或格式不受支持",
            "重新生成或检查源文件",
            false,
            Severity::Permanent,
        ),

        PrintError::NoDefaultPrinter => HumanError::new(
            "打印失败：未检测到默认打印机，或打印机不可用",
            "请在系统设置中设置默认打印机并确保其可用",
            false,
            Severity::ActionRequired,
        ),

        PrintError::ExecutionFailed { stderr } => HumanError::new(
            stderr.trim(),
            "检查打印机状态、纸张、驱动",
            true,
            Severity::Transient,
        ),

        // -- Catch-all --
        PrintError::Internal(_) | PrintError::Io(_) | PrintError::Serialization(_) => {
            HumanError::new(
                format!("未知错误：{err}"),
                "如多次出现此类错误，请联系技术支持",
                true,
                Severity::Transient,
            )
        }
    }
}
