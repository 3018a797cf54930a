//! 电池指标的文本格式化
//!
//! 模板中的占位符写作 `{field}` 或 `{field:modifier}`，`{{` 与 `}}` 表示字面量括号。
//!
//! | 字段         | 含义                                   |
//! |--------------|----------------------------------------|
//! | `fraction`   | 剩余电量比例，例如 `0.85`              |
//! | `percent`    | 剩余电量百分比，例如 `85%`             |
//! | `state`      | 电池状态，例如 `Charging`、`Full`      |
//! | `remaining`  | 充电时距离充满，否则距离耗尽的时间     |
//! | `untilFull`  | 距离充满的时间                         |
//! | `untilEmpty` | 距离耗尽的时间                         |
//!
//! 时间字段支持 `dur`（默认，精确到分钟，如 `4h3m`）与 `short`（如 `4h`）。
//! 未知字段在解析模板时即报错。

use crate::battery::{BatteryMetrics, BatteryState};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// 渲染错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// 模板引用的时间字段在本次采样中不存在
    MissingField(&'static str),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::MissingField(name) => write!(f, "缺少字段: {name}"),
        }
    }
}

impl std::error::Error for FormatError {}

/// 模板解析错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    UnknownField { name: String, position: usize },
    UnknownModifier { name: String, position: usize },
    InvalidModifier { field: String, modifier: String },
    Unbalanced { position: usize },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::UnknownField { name, position } => {
                write!(f, "位置 {position}: 未知字段 {name:?}")
            }
            TemplateError::UnknownModifier { name, position } => {
                write!(f, "位置 {position}: 未知修饰符 {name:?}")
            }
            TemplateError::InvalidModifier { field, modifier } => {
                write!(f, "字段 {field:?} 不支持修饰符 {modifier:?}")
            }
            TemplateError::Unbalanced { position } => {
                write!(f, "位置 {position}: 括号不匹配")
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// 将电池指标渲染为可读文本
pub trait MetricFormatter: Send + Sync {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError>;

    /// 近似最大输出宽度的示例文本，用于布局居中
    fn max_formatted_width(&self) -> Option<String> {
        None
    }
}

pub type SharedFormatter = Arc<dyn MetricFormatter>;

/// 以 -∞ 方向为偏向的四舍五入（0.5 向下取整）
#[inline]
pub fn round_bias_low(x: f64) -> i64 {
    (x - 0.5).ceil() as i64
}

/// 以分钟精度渲染时长，例如 `4h3m`、`4h`、`0m`
pub fn clean_duration(d: Duration) -> String {
    let minutes = d.as_secs() / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h{m}m"),
    }
}

/// 只保留最高位单位，例如 `4h`、`3m`
pub fn short_duration(d: Duration) -> String {
    let minutes = d.as_secs() / 60;
    match minutes / 60 {
        0 => format!("{minutes}m"),
        hours => format!("{hours}h"),
    }
}

fn percent(fraction: f64) -> String {
    format!("{}%", round_bias_low(fraction * 100.0))
}

fn required(value: Option<Duration>, name: &'static str) -> Result<Duration, FormatError> {
    value.ok_or(FormatError::MissingField(name))
}

/// 电池状态名称
#[derive(Debug, Default, Clone, Copy)]
pub struct StateFormat;

impl MetricFormatter for StateFormat {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError> {
        Ok(metrics.state.to_string())
    }
}

/// 整数百分比
#[derive(Debug, Default, Clone, Copy)]
pub struct PercentFormat;

impl MetricFormatter for PercentFormat {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError> {
        Ok(percent(metrics.fraction))
    }

    fn max_formatted_width(&self) -> Option<String> {
        Some("100%".to_string())
    }
}

/// 剩余时间；充满或耗尽时显示 `Full`/`Empty`
#[derive(Debug, Default, Clone, Copy)]
pub struct RemainingFormat;

impl MetricFormatter for RemainingFormat {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError> {
        let text = match metrics.state {
            BatteryState::Charging => {
                clean_duration(required(metrics.until_full, "untilFull")?) + " left"
            }
            BatteryState::Discharging => {
                clean_duration(required(metrics.until_empty, "untilEmpty")?) + " left"
            }
            BatteryState::FullyCharged => "Full".to_string(),
            BatteryState::Empty => "Empty".to_string(),
            _ => "???".to_string(),
        };
        Ok(text)
    }
}

/// 百分比加距离耗尽的时间
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleFormat;

impl MetricFormatter for SimpleFormat {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError> {
        let until_empty = required(metrics.until_empty, "untilEmpty")?;
        Ok(format!(
            "{:2}% {}",
            round_bias_low(metrics.fraction * 100.0),
            clean_duration(until_empty)
        ))
    }
}

/// 默认的轮换格式：状态、百分比、剩余时间
pub fn default_formatters() -> Vec<SharedFormatter> {
    vec![
        Arc::new(StateFormat),
        Arc::new(PercentFormat),
        Arc::new(RemainingFormat),
    ]
}

/// 解析命令行给出的模板；为空时使用默认格式
pub fn parse_formatters(sources: &[String]) -> Result<Vec<SharedFormatter>, TemplateError> {
    if sources.is_empty() {
        return Ok(default_formatters());
    }
    sources
        .iter()
        .map(|src| TemplateFormatter::parse(src).map(|t| Arc::new(t) as SharedFormatter))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Fraction,
    Percent,
    State,
    Remaining,
    UntilFull,
    UntilEmpty,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "fraction" => Field::Fraction,
            "percent" => Field::Percent,
            "state" => Field::State,
            "remaining" => Field::Remaining,
            "untilFull" => Field::UntilFull,
            "untilEmpty" => Field::UntilEmpty,
            _ => return None,
        };
        Some(field)
    }

    #[inline]
    fn is_duration(self) -> bool {
        matches!(self, Field::Remaining | Field::UntilFull | Field::UntilEmpty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationStyle {
    Clean,
    Short,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Field(Field, DurationStyle),
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z]+)(?::([A-Za-z]+))?\}").expect("占位符正则无效")
});

/// 基于模板的格式化器
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    tokens: Vec<Token>,
}

impl TemplateFormatter {
    /// 解析并校验模板
    pub fn parse(src: &str) -> Result<Self, TemplateError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(src) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(&mut literal, &src[last..whole.start()], last)?;
            last = whole.end();

            match whole.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                _ => {
                    let name = &caps[1];
                    let field = Field::parse(name).ok_or_else(|| TemplateError::UnknownField {
                        name: name.to_string(),
                        position: whole.start(),
                    })?;
                    let style = match caps.get(2).map(|m| m.as_str()) {
                        None => DurationStyle::Clean,
                        Some(modifier) => {
                            let style = match modifier {
                                "dur" => DurationStyle::Clean,
                                "short" => DurationStyle::Short,
                                _ => {
                                    return Err(TemplateError::UnknownModifier {
                                        name: modifier.to_string(),
                                        position: whole.start(),
                                    });
                                }
                            };
                            if !field.is_duration() {
                                return Err(TemplateError::InvalidModifier {
                                    field: name.to_string(),
                                    modifier: modifier.to_string(),
                                });
                            }
                            style
                        }
                    };

                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Field(field, style));
                }
            }
        }
        push_literal(&mut literal, &src[last..], last)?;
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self { tokens })
    }

    fn render_field(
        metrics: &BatteryMetrics,
        field: Field,
        style: DurationStyle,
    ) -> Result<String, FormatError> {
        let duration = |value: Option<Duration>, name| {
            required(value, name).map(|d| match style {
                DurationStyle::Clean => clean_duration(d),
                DurationStyle::Short => short_duration(d),
            })
        };

        match field {
            Field::Fraction => Ok(metrics.fraction.to_string()),
            Field::Percent => Ok(percent(metrics.fraction)),
            Field::State => Ok(metrics.state.to_string()),
            Field::Remaining => duration(metrics.remaining(), "remaining"),
            Field::UntilFull => duration(metrics.until_full, "untilFull"),
            Field::UntilEmpty => duration(metrics.until_empty, "untilEmpty"),
        }
    }
}

/// 追加字面量文本；未转义的括号视为错误
fn push_literal(out: &mut String, text: &str, offset: usize) -> Result<(), TemplateError> {
    if let Some(i) = text.find(['{', '}']) {
        return Err(TemplateError::Unbalanced {
            position: offset + i,
        });
    }
    out.push_str(text);
    Ok(())
}

impl MetricFormatter for TemplateFormatter {
    fn format(&self, metrics: &BatteryMetrics) -> Result<String, FormatError> {
        let mut out = String::with_capacity(32);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Field(field, style) => {
                    out.push_str(&Self::render_field(metrics, *field, *style)?)
                }
            }
        }
        // 多行模板折叠为单行
        Ok(out.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}
