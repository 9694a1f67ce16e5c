//! 通用工具函数

use chrono::{DateTime, Utc};

/// 生成上传文件的落盘文件名
///
/// 形如 `{患者ID}_{时间戳}_{原始文件名}`，患者ID在前便于按患者检索。
pub fn upload_file_name(patient_id: &str, original: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        sanitize_component(patient_id),
        at.format("%Y%m%d%H%M%S"),
        sanitize_component(original)
    )
}

/// 清理用户提供的文件名成分
///
/// 去掉路径分隔符与父目录引用，防止写出存储目录之外。
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '-',
            c => c,
        })
        .collect();

    let cleaned = cleaned.replace("..", "-");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
