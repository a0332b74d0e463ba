use std::str::FromStr;

use super::dialog::DialogRef;
use super::ids::{CallId, DialogId, QuestionId};
use crate::error::ParseError;

/// Navigation target parsed once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkIntent {
    Dialog {
        dialog: DialogRef,
    },
    Callsite {
        dialog: DialogRef,
        course: u32,
        call_id: CallId,
    },
    Genseq {
        dialog: DialogRef,
        course: u32,
        genseq: u32,
    },
    Q4h {
        question_id: QuestionId,
        root_id: Option<DialogId>,
        self_id: Option<DialogId>,
        course: Option<u32>,
        message_index: Option<u32>,
        call_id: Option<CallId>,
    },
}

impl DeepLinkIntent {
    pub fn question(question_id: impl Into<QuestionId>) -> Self {
        Self::Q4h {
            question_id: question_id.into(),
            root_id: None,
            self_id: None,
            course: None,
            message_index: None,
            call_id: None,
        }
    }

    /// Dialog the intent names directly, if any.
    pub fn dialog(&self) -> Option<DialogRef> {
        match self {
            DeepLinkIntent::Dialog { dialog }
            | DeepLinkIntent::Callsite { dialog, .. }
            | DeepLinkIntent::Genseq { dialog, .. } => Some(dialog.clone()),
            DeepLinkIntent::Q4h {
                root_id, self_id, ..
            } => {
                let root_id = root_id.clone()?;
                let self_id = self_id.clone().unwrap_or_else(|| root_id.clone());
                Some(DialogRef { root_id, self_id })
            }
        }
    }
}

fn invalid(target: &str, why: &str) -> ParseError {
    ParseError::InvalidFormat(format!("deep link {target:?}: {why}"))
}

fn dialog_id(target: &str, part: Option<&str>, name: &str) -> Result<DialogId, ParseError> {
    match part {
        Some(s) if !s.is_empty() => Ok(DialogId::new(s)),
        _ => Err(invalid(target, &format!("missing {name}"))),
    }
}

fn number(target: &str, part: Option<&str>, name: &str) -> Result<u32, ParseError> {
    let raw = part.ok_or_else(|| invalid(target, &format!("missing {name}")))?;
    raw.parse()
        .map_err(|_| invalid(target, &format!("{name} is not a number: {raw:?}")))
}

impl FromStr for DeepLinkIntent {
    type Err = ParseError;

    fn from_str(target: &str) -> Result<Self, Self::Err> {
        let trimmed = target.trim().trim_start_matches('#').trim_start_matches('/');
        let (path, query) = match trimmed.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (trimmed, None),
        };
        let mut parts = path.split('/').filter(|p| !p.is_empty());

        match parts.next() {
            Some("dialog") => {
                let root_id = dialog_id(target, parts.next(), "root id")?;
                let self_id = match parts.next() {
                    Some(s) => DialogId::new(s),
                    None => root_id.clone(),
                };
                Ok(DeepLinkIntent::Dialog {
                    dialog: DialogRef { root_id, self_id },
                })
            }
            Some("callsite") => {
                let root_id = dialog_id(target, parts.next(), "root id")?;
                let self_id = dialog_id(target, parts.next(), "self id")?;
                let course = number(target, parts.next(), "course")?;
                let call_id = match parts.next() {
                    Some(s) => CallId::new(s),
                    None => return Err(invalid(target, "missing call id")),
                };
                Ok(DeepLinkIntent::Callsite {
                    dialog: DialogRef { root_id, self_id },
                    course,
                    call_id,
                })
            }
            Some("genseq") => {
                let root_id = dialog_id(target, parts.next(), "root id")?;
                let self_id = dialog_id(target, parts.next(), "self id")?;
                let course = number(target, parts.next(), "course")?;
                let genseq = number(target, parts.next(), "genseq")?;
                Ok(DeepLinkIntent::Genseq {
                    dialog: DialogRef { root_id, self_id },
                    course,
                    genseq,
                })
            }
            Some("q4h") => {
                let question_id = match parts.next() {
                    Some(s) => QuestionId::new(s),
                    None => return Err(invalid(target, "missing question id")),
                };
                let (mut root_id, mut self_id, mut course, mut message_index, mut call_id) =
                    (None, None, None, None, None);
                for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or_else(|| invalid(target, &format!("bad query pair {pair:?}")))?;
                    if value.is_empty() {
                        continue;
                    }
                    match key {
                        "root" => root_id = Some(DialogId::new(value)),
                        "self" => self_id = Some(DialogId::new(value)),
                        "course" => course = Some(number(target, Some(value), "course")?),
                        "msg" => message_index = Some(number(target, Some(value), "msg")?),
                        "call" => call_id = Some(CallId::new(value)),
                        _ => return Err(invalid(target, &format!("unknown key {key:?}"))),
                    }
                }
                Ok(DeepLinkIntent::Q4h {
                    question_id,
                    root_id,
                    self_id,
                    course,
                    message_index,
                    call_id,
                })
            }
            Some(other) => Err(invalid(target, &format!("unknown kind {other:?}"))),
            None => Err(invalid(target, "empty target")),
        }
    }
}
