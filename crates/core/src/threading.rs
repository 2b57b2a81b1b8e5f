//! Conversation threading: subject normalization and thread placement.

use chrono::{DateTime, Utc};

use crate::domain::email::{normalize_address, Email, ThreadId};
use crate::domain::thread::{ThreadContext, ThreadPlacement};

const REPLY_PREFIXES: [&str; 3] = ["re:", "fwd:", "fw:"];
/// Below this length a subject must match exactly; above it, containment is enough.
const CONTAINMENT_MIN_CHARS: usize = 10;
const SUMMARY_EMAILS: usize = 5;
const SUMMARY_BODY_CHARS: usize = 160;

/// Strips any run of leading `Re:`/`Fwd:`/`Fw:` tokens, collapses whitespace, lowercases.
pub fn normalize_subject(subject: &str) -> String {
    let mut rest = subject.trim();
    loop {
        let lowered = rest.to_ascii_lowercase();
        let Some(prefix) = REPLY_PREFIXES.iter().find(|prefix| lowered.starts_with(*prefix)) else {
            break;
        };
        rest = rest[prefix.len()..].trim_start();
    }

    rest.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Exact match, or containment either way when both sides exceed ten characters
/// (providers truncate long subjects).
pub fn subjects_match(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    if left.chars().count() <= CONTAINMENT_MIN_CHARS
        || right.chars().count() <= CONTAINMENT_MIN_CHARS
    {
        return false;
    }
    left.contains(right) || right.contains(left)
}

/// Order-independent key for the two participants.
pub fn participants_key(first: &str, second: &str) -> String {
    let mut pair = [normalize_address(first), normalize_address(second)];
    pair.sort();
    format!("{}|{}", pair[0], pair[1])
}

pub fn mint_thread_id(
    from_address: &str,
    to_address: &str,
    normalized_subject: &str,
    salt: DateTime<Utc>,
) -> ThreadId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(participants_key(from_address, to_address).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized_subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(salt.timestamp_nanos_opt().unwrap_or_default().to_string().as_bytes());
    let digest = hasher.finalize().to_hex();
    ThreadId(format!("thr_{}", &digest.as_str()[..16]))
}

/// Places an email relative to `prior` emails between the same participants.
///
/// `prior` may contain anything; only threaded emails between the same two
/// addresses are considered, newest first.
pub fn place_in_thread(
    subject: &str,
    from_address: &str,
    to_address: &str,
    prior: &[Email],
    now: DateTime<Utc>,
) -> ThreadPlacement {
    let normalized = normalize_subject(subject);

    let mut candidates = prior
        .iter()
        .filter(|email| email.thread_id.is_some() && email.is_between(from_address, to_address))
        .collect::<Vec<_>>();
    candidates.sort_by(|left, right| right.created_at.cmp(&left.created_at));

    let matched = candidates
        .iter()
        .find(|email| subjects_match(&normalize_subject(&email.subject), &normalized))
        .and_then(|email| email.thread_id.clone());

    match matched {
        Some(thread_id) => {
            let last_position = candidates
                .iter()
                .filter(|email| email.thread_id.as_ref() == Some(&thread_id))
                .filter_map(|email| email.thread_position)
                .max()
                .unwrap_or(0);
            ThreadPlacement { thread_id, position: last_position + 1, is_thread_start: false }
        }
        None => ThreadPlacement {
            thread_id: mint_thread_id(from_address, to_address, &normalized, now),
            position: 1,
            is_thread_start: true,
        },
    }
}

/// One line per email for the last five emails: `subject: first 160 chars of body`.
pub fn summarize_thread(emails: &[Email]) -> String {
    let skip = emails.len().saturating_sub(SUMMARY_EMAILS);
    emails
        .iter()
        .skip(skip)
        .map(|email| {
            let body = email.body.split_whitespace().collect::<Vec<_>>().join(" ");
            let excerpt = body.chars().take(SUMMARY_BODY_CHARS).collect::<String>();
            format!("{}: {}", email.subject.trim(), excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Orders `emails` by thread position and derives the participant roles from
/// `current`, the customer's latest message.
pub fn build_context(thread_id: ThreadId, mut emails: Vec<Email>, current: &Email) -> ThreadContext {
    emails.sort_by(|left, right| {
        left.thread_position
            .cmp(&right.thread_position)
            .then_with(|| left.created_at.cmp(&right.created_at))
    });
    let summary = summarize_thread(&emails);
    ThreadContext {
        thread_id,
        emails,
        customer_address: current.from_address.clone(),
        business_address: current.to_address.clone(),
        summary,
    }
}
