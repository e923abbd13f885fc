//! # 数据驱动字段映射器
//!
//! 按声明式路径表达式在任意形状的 JSON 中读写值，并可附加命名转换。
//!
//! 路径语法：以 `.` 分隔的对象键，键后可跟若干 `[n]` 数组下标，例如
//! `choices[0].message.content`、`data.choices[0].content`。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// 路径中允许的最大数组下标
pub const MAX_INDEX: usize = 1024;

/// 字段映射错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// 路径上的键缺失或下标越界。与值为 `null` 的情况区分
    #[error("路径不存在: {path}")]
    PathNotFound { path: String },

    #[error("无效的路径表达式 '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// 写入时路径上已有不兼容的节点（例如在字符串下写对象键）
    #[error("路径冲突 '{path}': {reason}")]
    PathConflict { path: String, reason: String },

    #[error("未知的转换: {name}")]
    UnknownTransform { name: String },

    #[error("转换 {name} 失败: {message}")]
    TransformFailed { name: String, message: String },
}

/// 路径中的单步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// 解析后的路径表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    steps: Vec<PathStep>,
}

impl PathExpr {
    /// 解析路径表达式
    pub fn parse(raw: &str) -> Result<Self, MappingError> {
        let invalid = |reason: &str| MappingError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(invalid("路径为空"));
        }

        let mut steps = Vec::new();
        for segment in raw.split('.') {
            let (name, mut rest) = match segment.find('[') {
                Some(pos) => segment.split_at(pos),
                None => (segment, ""),
            };

            if name.is_empty() && rest.is_empty() {
                return Err(invalid("存在空的路径段"));
            }
            if name.contains(']') {
                return Err(invalid("未匹配的 ']'"));
            }
            if !name.is_empty() {
                steps.push(PathStep::Key(name.to_string()));
            }

            while !rest.is_empty() {
                let Some(inner) = rest.strip_prefix('[') else {
                    return Err(invalid("下标之后只能继续跟下标"));
                };
                let Some(close) = inner.find(']') else {
                    return Err(invalid("缺少 ']'"));
                };
                let index = inner[..close]
                    .parse::<usize>()
                    .map_err(|_| invalid("下标必须是非负整数"))?;
                if index > MAX_INDEX {
                    return Err(invalid(&format!("下标不能超过 {MAX_INDEX}")));
                }
                steps.push(PathStep::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    fn not_found(&self) -> MappingError {
        MappingError::PathNotFound {
            path: self.raw.clone(),
        }
    }

    fn conflict(&self, reason: impl Into<String>) -> MappingError {
        MappingError::PathConflict {
            path: self.raw.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// 按路径读取值
///
/// 中间键缺失或下标越界返回 `MappingError::PathNotFound`；值本身为 `null` 时返回 `Ok(&Value::Null)`。
pub fn extract<'a>(tree: &'a Value, path: &str) -> Result<&'a Value, MappingError> {
    let expr = PathExpr::parse(path)?;
    extract_expr(tree, &expr)
}

pub fn extract_expr<'a>(tree: &'a Value, expr: &PathExpr) -> Result<&'a Value, MappingError> {
    let mut current = tree;
    for step in &expr.steps {
        current = match step {
            PathStep::Key(key) => current.as_object().and_then(|obj| obj.get(key)),
            PathStep::Index(index) => current.as_array().and_then(|arr| arr.get(*index)),
        }
        .ok_or_else(|| expr.not_found())?;
    }
    Ok(current)
}

/// 按路径写入值，按需创建中间对象与数组
///
/// 数组下标超出当前长度时以 `null` 补齐。路径上已有的 `null` 会被替换为所需容器，
/// 其他类型不匹配的节点返回 `MappingError::PathConflict`。
pub fn inject(tree: &mut Value, path: &str, value: Value) -> Result<(), MappingError> {
    let expr = PathExpr::parse(path)?;
    inject_expr(tree, &expr, value)
}

pub fn inject_expr(tree: &mut Value, expr: &PathExpr, value: Value) -> Result<(), MappingError> {
    let mut current = tree;
    for step in &expr.steps {
        current = match step {
            PathStep::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let Value::Object(obj) = current else {
                    return Err(expr.conflict(format!("'{key}' 的父节点不是对象")));
                };
                obj.entry(key.clone()).or_insert(Value::Null)
            }
            PathStep::Index(index) => {
                if current.is_null() {
                    *current = Value::Array(Vec::new());
                }
                let Value::Array(arr) = current else {
                    return Err(expr.conflict(format!("下标 [{index}] 的父节点不是数组")));
                };
                if arr.len() <= *index {
                    let len = index
                        .checked_add(1)
                        .ok_or_else(|| expr.conflict(format!("下标 [{index}] 溢出")))?;
                    arr.resize(len, Value::Null);
                }
                &mut arr[*index]
            }
        };
    }
    *current = value;
    Ok(())
}

/// 声明式映射条目：路径 + 可选转换
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl MappingEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            transform: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    /// 校验路径语法与转换名，不访问任何数据
    pub fn validate(&self) -> Result<(), MappingError> {
        PathExpr::parse(&self.path)?;
        if let Some(transform) = &self.transform {
            TransformRegistry::builtin().resolve(transform)?;
        }
        Ok(())
    }

    /// 从响应中读取并应用转换
    ///
    /// 仅当转换为 `default` 填充时，路径缺失才视为 `null` 继续转换。
    pub fn extract_from(&self, tree: &Value) -> Result<Value, MappingError> {
        let raw = match extract(tree, &self.path) {
            Ok(value) => value.clone(),
            Err(MappingError::PathNotFound { .. }) if self.fills_default() => Value::Null,
            Err(err) => return Err(err),
        };
        self.transform_value(raw)
    }

    /// 应用转换后写入请求体
    pub fn inject_into(&self, tree: &mut Value, value: Value) -> Result<(), MappingError> {
        let value = self.transform_value(value)?;
        inject(tree, &self.path, value)
    }

    fn transform_value(&self, value: Value) -> Result<Value, MappingError> {
        match &self.transform {
            Some(transform) => apply_transform(&value, transform),
            None => Ok(value),
        }
    }

    fn fills_default(&self) -> bool {
        self.transform
            .as_deref()
            .is_some_and(|t| TransformSpec::parse(t).name == "default")
    }
}

/// 转换名与可选参数，形如 `multiply:1000`
#[derive(Debug, Clone, PartialEq, Eq)]
struct TransformSpec<'a> {
    name: &'a str,
    arg: Option<&'a str>,
}

impl<'a> TransformSpec<'a> {
    fn parse(spec: &'a str) -> Self {
        match spec.split_once(':') {
            Some((name, arg)) => Self {
                name: name.trim(),
                arg: Some(arg),
            },
            None => Self {
                name: spec.trim(),
                arg: None,
            },
        }
    }
}

/// 转换函数：输入值与可选参数，返回新值或失败原因
pub type TransformFn = fn(&Value, Option<&str>) -> Result<Value, String>;

/// 命名纯函数转换表
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// 空转换表
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// 内置转换表
    pub fn builtin() -> &'static Self {
        static BUILTIN: OnceLock<TransformRegistry> = OnceLock::new();
        BUILTIN.get_or_init(Self::with_builtins)
    }

    /// 包含全部内置转换的新表，可在其上继续注册
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", |v, _| Ok(v.clone()));
        registry.register("to_number", to_number);
        registry.register("to_string", to_string);
        registry.register("to_boolean", to_boolean);
        registry.register("trim", |v, _| map_str(v, |s| s.trim().to_string()));
        registry.register("lowercase", |v, _| map_str(v, str::to_lowercase));
        registry.register("uppercase", |v, _| map_str(v, str::to_uppercase));
        registry.register("default", default_fill);
        registry.register("fixed", |_, arg| Ok(parse_literal(arg.unwrap_or_default())));
        registry.register("multiply", |v, arg| scale(v, arg, |n, f| n * f));
        registry.register("divide", |v, arg| {
            if parse_factor(arg)? == 0.0 {
                return Err("除数不能为0".to_string());
            }
            scale(v, arg, |n, f| n / f)
        });
        registry.register("join", join);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, transform: TransformFn) {
        self.transforms.insert(name.into(), transform);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, spec: &str) -> Result<TransformFn, MappingError> {
        let parsed = TransformSpec::parse(spec);
        self.transforms
            .get(parsed.name)
            .copied()
            .ok_or_else(|| MappingError::UnknownTransform {
                name: parsed.name.to_string(),
            })
    }

    /// 按名称应用转换
    pub fn apply(&self, value: &Value, spec: &str) -> Result<Value, MappingError> {
        let transform = self.resolve(spec)?;
        let parsed = TransformSpec::parse(spec);
        transform(value, parsed.arg).map_err(|message| MappingError::TransformFailed {
            name: parsed.name.to_string(),
            message,
        })
    }
}

/// 使用内置转换表应用转换
pub fn apply_transform(value: &Value, spec: &str) -> Result<Value, MappingError> {
    TransformRegistry::builtin().apply(value, spec)
}

#[allow(clippy::cast_possible_truncation)]
fn number_value(n: f64) -> Result<Value, String> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| format!("{n} 不是有限数值"))
}

fn to_number(value: &Value, _: Option<&str>) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' 无法转换为数值"))
            .and_then(number_value),
        Value::Bool(b) => Ok(Value::from(u8::from(*b))),
        Value::Null => Ok(Value::Null),
        _ => Err("只能转换字符串、数值或布尔值".to_string()),
    }
}

fn to_string(value: &Value, _: Option<&str>) -> Result<Value, String> {
    match value {
        Value::String(_) | Value::Null => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Ok(Value::String(other.to_string())),
    }
}

fn to_boolean(value: &Value, _: Option<&str>) -> Result<Value, String> {
    match value {
        Value::Bool(_) | Value::Null => Ok(value.clone()),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' 无法转换为布尔值")),
        },
        _ => Err("只能转换字符串、数值或布尔值".to_string()),
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(f(s))),
        Value::Null => Ok(Value::Null),
        _ => Err("只能作用于字符串".to_string()),
    }
}

fn default_fill(value: &Value, arg: Option<&str>) -> Result<Value, String> {
    let Some(arg) = arg else {
        return Err("default 需要参数，例如 default:0".to_string());
    };
    if value.is_null() {
        Ok(parse_literal(arg))
    } else {
        Ok(value.clone())
    }
}

/// 参数优先按 JSON 解析，失败时视为字符串
fn parse_literal(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

fn parse_factor(arg: Option<&str>) -> Result<f64, String> {
    arg.ok_or_else(|| "缺少数值参数".to_string())?
        .trim()
        .parse::<f64>()
        .map_err(|_| "参数必须是数值".to_string())
}

fn scale(value: &Value, arg: Option<&str>, op: impl Fn(f64, f64) -> f64) -> Result<Value, String> {
    let factor = parse_factor(arg)?;
    match value {
        Value::Number(n) => {
            let n = n.as_f64().ok_or_else(|| "数值超出范围".to_string())?;
            number_value(op(n, factor))
        }
        Value::Null => Ok(Value::Null),
        _ => Err("只能作用于数值".to_string()),
    }
}

/// 拼接字符串数组，对象元素取其 `text` 字段
fn join(value: &Value, arg: Option<&str>) -> Result<Value, String> {
    let separator = arg.unwrap_or("");
    match value {
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                    _ => None,
                })
                .collect();
            Ok(Value::String(parts.join(separator)))
        }
        Value::String(_) | Value::Null => Ok(value.clone()),
        _ => Err("只能作用于数组".to_string()),
    }
}
