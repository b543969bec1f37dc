//! 目标列表输入
//!
//! 把换行分隔的文本解析为目标列表：裁剪空白、丢弃空行、去重（保留首次出现的顺序）

use crate::error::Result;
use crate::monitor::target::Target;
use std::collections::HashSet;
use std::path::Path;

/// 解析换行分隔的目标列表
pub fn parse_targets(text: &str) -> Vec<Target> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(Target::parse)
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// 合并多个来源的目标，去重并保持顺序
pub fn merge_targets<I>(sources: I) -> Vec<Target>
where
    I: IntoIterator<Item = Target>,
{
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// 从文件读取目标列表
pub async fn read_targets_file<P: AsRef<Path>>(path: P) -> Result<Vec<Target>> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(parse_targets(&content))
}
