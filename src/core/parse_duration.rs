use std::time::Duration;

use crate::models::error::LoadError;

/// 解析 `500ms`、`30s`、`1m30s`、`1.5h` 这类时长，纯数字按秒处理
pub fn parse_duration(input: &str) -> Result<Duration, LoadError> {
    let s = input.trim();
    let invalid = |reason: &str| LoadError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    if s.is_empty() {
        return Err(invalid("时长不能为空"));
    }
    if let Ok(secs) = s.parse::<f64>() {
        return seconds(secs).ok_or_else(|| invalid("时长必须是非负数"));
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("缺少单位"))?;
        if digits == 0 {
            return Err(invalid("缺少数值"));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| invalid("数值格式错误"))?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            other => return Err(invalid(&format!("未知单位 '{}'，可用 ms/s/m/h/d", other))),
        };
        total += value * factor;
        rest = &rest[unit_len..];
    }
    seconds(total).ok_or_else(|| invalid("时长超出范围"))
}

fn seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// 和 parse_duration 对应的简短显示
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let mut secs = duration.as_secs();
    let mut out = String::new();
    for (unit, size) in [("h", 3600), ("m", 60)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}
