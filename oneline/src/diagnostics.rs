//! Diagnostics produced by the resolver and layout engine.
//!
//! Expected topology problems are reported as data, never as `Err`.
//! Validation produces [`ValidationIssue`]s (errors block evaluation,
//! warnings do not); evaluation and layout produce [`Alert`]s.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ElementCategory, Side};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Stable codes for validation issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    DuplicateTag,
    BidirectionalMismatch,
    MissingEndpoint,
    MissingEndpoints,
    SelfReference,
    SameBothEnds,
    MissingLoadBus,
    UnknownTarget,
    LoadBusCreated,
}

impl IssueCode {
    pub const ALL: [IssueCode; 9] = [
        IssueCode::DuplicateTag,
        IssueCode::BidirectionalMismatch,
        IssueCode::MissingEndpoint,
        IssueCode::MissingEndpoints,
        IssueCode::SelfReference,
        IssueCode::SameBothEnds,
        IssueCode::MissingLoadBus,
        IssueCode::UnknownTarget,
        IssueCode::LoadBusCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::DuplicateTag => "DUPLICATE_TAG",
            IssueCode::BidirectionalMismatch => "BIDIRECTIONAL_MISMATCH",
            IssueCode::MissingEndpoint => "MISSING_ENDPOINT",
            IssueCode::MissingEndpoints => "MISSING_ENDPOINTS",
            IssueCode::SelfReference => "SELF_REFERENCE",
            IssueCode::SameBothEnds => "SAME_BOTH_ENDS",
            IssueCode::MissingLoadBus => "MISSING_LOAD_BUS",
            IssueCode::UnknownTarget => "UNKNOWN_TARGET",
            IssueCode::LoadBusCreated => "LOAD_BUS_CREATED",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            IssueCode::UnknownTarget | IssueCode::LoadBusCreated => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            IssueCode::DuplicateTag => "Two records share the same tag",
            IssueCode::BidirectionalMismatch => {
                "Element A references element B but B does not reference A back"
            }
            IssueCode::MissingEndpoint => "A branch has an empty from or to reference",
            IssueCode::MissingEndpoints => "A passive element references nothing on either side",
            IssueCode::SelfReference => "An element references its own tag",
            IssueCode::SameBothEnds => "An element has identical from and to references",
            IssueCode::MissingLoadBus => "A load has no connected bus",
            IssueCode::UnknownTarget => "A reference names no known record and may become a new bus",
            IssueCode::LoadBusCreated => "A load referenced an unknown bus; a bus was created for it",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub source_tag: String,
    pub source_type: ElementCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        code: IssueCode,
        source_tag: impl Into<String>,
        source_type: ElementCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            source_tag: source_tag.into(),
            source_type,
            side: None,
            message: message.into(),
        }
    }

    pub fn on_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

/// Severity of an evaluation or layout alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

impl From<AlertLevel> for Severity {
    fn from(level: AlertLevel) -> Self {
        match level {
            AlertLevel::Info => Severity::Info,
            AlertLevel::Warning => Severity::Warning,
            AlertLevel::Error => Severity::Error,
        }
    }
}

/// Stable codes for evaluation and layout alerts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCode {
    SyntheticBus,
    UnresolvablePassive,
    PassiveCycle,
    UnresolvedBranch,
    BranchLoop,
    NoFreeSlot,
    ChainCycle,
    ChainAborted,
    ChainBusMissing,
    OverrideIgnored,
    IslandWithoutSource,
}

impl AlertCode {
    pub const ALL: [AlertCode; 11] = [
        AlertCode::SyntheticBus,
        AlertCode::UnresolvablePassive,
        AlertCode::PassiveCycle,
        AlertCode::UnresolvedBranch,
        AlertCode::BranchLoop,
        AlertCode::NoFreeSlot,
        AlertCode::ChainCycle,
        AlertCode::ChainAborted,
        AlertCode::ChainBusMissing,
        AlertCode::OverrideIgnored,
        AlertCode::IslandWithoutSource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCode::SyntheticBus => "SYNTHETIC_BUS",
            AlertCode::UnresolvablePassive => "UNRESOLVABLE_PASSIVE",
            AlertCode::PassiveCycle => "PASSIVE_CYCLE",
            AlertCode::UnresolvedBranch => "UNRESOLVED_BRANCH",
            AlertCode::BranchLoop => "BRANCH_LOOP",
            AlertCode::NoFreeSlot => "NO_FREE_SLOT",
            AlertCode::ChainCycle => "CHAIN_CYCLE",
            AlertCode::ChainAborted => "CHAIN_ABORTED",
            AlertCode::ChainBusMissing => "CHAIN_BUS_MISSING",
            AlertCode::OverrideIgnored => "OVERRIDE_IGNORED",
            AlertCode::IslandWithoutSource => "ISLAND_WITHOUT_SOURCE",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AlertCode::SyntheticBus => "A bus was created to terminate an otherwise open endpoint",
            AlertCode::UnresolvablePassive => "A passive element references only unknown tags",
            AlertCode::PassiveCycle => "A run of passive elements loops back on itself",
            AlertCode::UnresolvedBranch => "A branch finished evaluation without two buses",
            AlertCode::BranchLoop => "A branch reaches itself through its own passive elements",
            AlertCode::NoFreeSlot => "A neighbouring branch had no free endpoint for a junction bus",
            AlertCode::ChainCycle => "Chain tracing hit a loop; the chain was omitted",
            AlertCode::ChainAborted => "Chain tracing hit a dead end or unknown tag; the chain was omitted",
            AlertCode::ChainBusMissing => "A chain terminates at a bus missing from the bus list",
            AlertCode::OverrideIgnored => "A saved coordinate override could not be applied",
            AlertCode::IslandWithoutSource => "A group of connected buses has no source bus",
        }
    }
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic raised while evaluating or laying out
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub code: AlertCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, code: AlertCode, message: impl Into<String>) -> Self {
        Self {
            level,
            code,
            tag: None,
            message: message.into(),
        }
    }

    pub fn info(code: AlertCode, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, code, message)
    }

    pub fn warning(code: AlertCode, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, code, message)
    }

    pub fn error(code: AlertCode, message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, code, message)
    }

    pub fn for_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == AlertLevel::Error
    }
}

pub fn has_error(alerts: &[Alert]) -> bool {
    alerts.iter().any(Alert::is_error)
}
