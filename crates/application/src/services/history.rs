use std::collections::HashSet;

use domain::{ChatMessage, MessageId};

/// 合并最近的广播消息和与用户相关的消息，用于连接时的历史回放。
///
/// 结果按创建时间升序排列，同一条消息只出现一次（用户自己发出的广播会同时出现在两个输入中）。
/// 时间戳相同时保留各输入内部的先后顺序，且广播序列优先。
pub fn merge_history(
    mut broadcasts: Vec<ChatMessage>,
    mut involving: Vec<ChatMessage>,
) -> Vec<ChatMessage> {
    // 存储约定按时间升序返回；稳定排序保证即使不满足约定也不打乱同时刻的消息
    broadcasts.sort_by_key(|m| m.created_at);
    involving.sort_by_key(|m| m.created_at);

    let mut seen: HashSet<MessageId> = HashSet::with_capacity(broadcasts.len() + involving.len());
    let mut merged = Vec::with_capacity(broadcasts.len() + involving.len());
    let mut left = broadcasts.into_iter().peekable();
    let mut right = involving.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.created_at <= r.created_at,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        if let Some(message) = next {
            if seen.insert(message.id) {
                merged.push(message);
            }
        }
    }

    merged
}
