//! Conversation thread reconstruction
//!
//! A chat's history is a tree of messages linked by parent pointers, with a
//! `current_id` naming the active leaf. The linear conversation a user sees is
//! the path from the root down to that leaf, which this module recovers by
//! walking parent links upward and reversing.

use std::collections::{HashMap, HashSet};

use crate::api::Message;

/// Reconstruct the linear thread ending at `current_id`
///
/// Walks parent links from `current_id` to the root and returns the visited
/// messages oldest first. The walk stops silently when an id is missing from
/// `messages` (a truncated chain) or has already been visited (a cycle), so
/// malformed server data never produces an error.
///
/// # Arguments
///
/// * `messages` - All messages of the chat keyed by id
/// * `current_id` - The leaf to start from; `None` yields an empty thread
///
/// # Returns
///
/// Messages from root to leaf. Each consecutive pair satisfies
/// `next.parent_id == Some(prev.id)` and no id repeats.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use chatdroid::api::{Message, Role};
/// use chatdroid::thread::reconstruct_thread;
///
/// let mut messages = HashMap::new();
/// messages.insert("a".to_string(), Message::new("a", None, Role::User, "hi", 1));
/// messages.insert("b".to_string(), Message::new("b", Some("a"), Role::Assistant, "hello", 2));
///
/// let thread = reconstruct_thread(&messages, Some("b"));
/// let ids: Vec<_> = thread.iter().map(|m| m.id.as_str()).collect();
/// assert_eq!(ids, vec!["a", "b"]);
/// ```
pub fn reconstruct_thread(
    messages: &HashMap<String, Message>,
    current_id: Option<&str>,
) -> Vec<Message> {
    let mut thread = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = current_id;

    while let Some(id) = cursor {
        let Some(message) = messages.get(id) else {
            break;
        };
        if !visited.insert(message.id.as_str()) {
            tracing::debug!("Cycle detected at message {} during thread walk", id);
            break;
        }
        thread.push(message.clone());
        cursor = message.parent_id.as_deref();
    }

    thread.reverse();
    thread
}

/// Returns `true` when every message's parent is the message before it
///
/// The first message's own parent is not checked, since a truncated chain
/// may start at a message whose parent was never delivered.
pub fn is_linear_chain(thread: &[Message]) -> bool {
    thread
        .windows(2)
        .all(|pair| pair[1].parent_id.as_deref() == Some(pair[0].id.as_str()))
}
