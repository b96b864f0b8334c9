use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::error::LoadError;

/// JSONPath 断言：响应体中 jsonpath 取出的唯一值必须等于 reference_object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertOption {
    pub jsonpath: String,
    pub reference_object: Value,
}

impl AssertOption {
    /// 解析 `$.path=<json>`，右侧不是合法 json 时按字符串处理
    pub fn parse(input: &str) -> Result<Self, LoadError> {
        let (path, raw) = split_assignment(input)
            .ok_or_else(|| LoadError::InvalidConfig(format!("断言格式应为 $.path=<json>: {}", input)))?;
        let path = path.trim();
        if !path.starts_with('$') {
            return Err(LoadError::InvalidConfig(format!("jsonpath 必须以 $ 开头: {}", path)));
        }
        let raw = raw.trim();
        let reference_object =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Ok(AssertOption {
            jsonpath: path.to_string(),
            reference_object,
        })
    }
}

/// 在路径结束后的第一个 `=` 处切分，过滤表达式 `[?(@.k=='v')]` 里的 `=` 不算
fn split_assignment(input: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, '=') if depth == 0 => return Some((&input[..i], &input[i + 1..])),
            _ => {}
        }
    }
    None
}
