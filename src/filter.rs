//! Filter/predicate builder: turns a structured query request into one
//! combined boolean condition evaluated per row against the main record
//! and its ACL/tag membership sets. No per-predicate store round trips.

use crate::config::DriveDbConfig;
use crate::error::DriveDbError;
use crate::record::FileRecord;
use crate::time::UnixTimeUtc;
use compact_str::CompactString;
use im::OrdSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Inclusive `required_security_group` range. Mandatory on every query;
/// there is no unfiltered read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRange {
    pub start: i32,
    pub end: i32,
}

impl SecurityGroupRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn single(value: i32) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Inclusive range over `user_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDateSpan {
    pub start: UnixTimeUtc,
    pub end: UnixTimeUtc,
}

impl UserDateSpan {
    pub fn new(start: UnixTimeUtc, end: UnixTimeUtc) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, value: UnixTimeUtc) -> bool {
        value >= self.start && value <= self.end
    }
}

/// The full filter set of a query. All supplied predicates AND together;
/// the security-group/ACL composition is itself one AND term (see
/// `CompiledFilter::matches`). Builder methods normalize empty lists to
/// "not supplied".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilters {
    pub required_security_group: SecurityGroupRange,
    pub acl_any_of: Option<Vec<Uuid>>,
    pub tags_any_of: Option<Vec<Uuid>>,
    pub tags_all_of: Option<Vec<Uuid>>,
    pub file_type_any_of: Option<Vec<i32>>,
    pub data_type_any_of: Option<Vec<i32>>,
    pub file_state_any_of: Option<Vec<i32>>,
    pub archival_status_any_of: Option<Vec<i32>>,
    pub file_system_type_any_of: Option<Vec<i32>>,
    pub sender_any_of: Option<Vec<CompactString>>,
    pub group_id_any_of: Option<Vec<Uuid>>,
    pub global_transit_id_any_of: Option<Vec<Uuid>>,
    pub unique_id_any_of: Option<Vec<Uuid>>,
    pub user_date_span: Option<UserDateSpan>,
}

fn normalize<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}

impl QueryFilters {
    pub fn security(range: SecurityGroupRange) -> Self {
        Self {
            required_security_group: range,
            acl_any_of: None,
            tags_any_of: None,
            tags_all_of: None,
            file_type_any_of: None,
            data_type_any_of: None,
            file_state_any_of: None,
            archival_status_any_of: None,
            file_system_type_any_of: None,
            sender_any_of: None,
            group_id_any_of: None,
            global_transit_id_any_of: None,
            unique_id_any_of: None,
            user_date_span: None,
        }
    }

    pub fn with_acl_any_of(mut self, members: Vec<Uuid>) -> Self {
        self.acl_any_of = normalize(members);
        self
    }

    pub fn with_tags_any_of(mut self, tags: Vec<Uuid>) -> Self {
        self.tags_any_of = normalize(tags);
        self
    }

    pub fn with_tags_all_of(mut self, tags: Vec<Uuid>) -> Self {
        self.tags_all_of = normalize(tags);
        self
    }

    pub fn with_file_types(mut self, types: Vec<i32>) -> Self {
        self.file_type_any_of = normalize(types);
        self
    }

    pub fn with_data_types(mut self, types: Vec<i32>) -> Self {
        self.data_type_any_of = normalize(types);
        self
    }

    pub fn with_file_states(mut self, states: Vec<i32>) -> Self {
        self.file_state_any_of = normalize(states);
        self
    }

    pub fn with_archival_statuses(mut self, statuses: Vec<i32>) -> Self {
        self.archival_status_any_of = normalize(statuses);
        self
    }

    pub fn with_file_system_types(mut self, types: Vec<i32>) -> Self {
        self.file_system_type_any_of = normalize(types);
        self
    }

    pub fn with_senders(mut self, senders: Vec<CompactString>) -> Self {
        self.sender_any_of = normalize(senders);
        self
    }

    pub fn with_group_ids(mut self, groups: Vec<Uuid>) -> Self {
        self.group_id_any_of = normalize(groups);
        self
    }

    pub fn with_global_transit_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.global_transit_id_any_of = normalize(ids);
        self
    }

    pub fn with_unique_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.unique_id_any_of = normalize(ids);
        self
    }

    pub fn with_user_date_span(mut self, span: UserDateSpan) -> Self {
        self.user_date_span = Some(span);
        self
    }

    pub(crate) fn validate(&self, config: &DriveDbConfig) -> Result<(), DriveDbError> {
        let lengths = [
            self.acl_any_of.as_ref().map(Vec::len),
            self.tags_any_of.as_ref().map(Vec::len),
            self.tags_all_of.as_ref().map(Vec::len),
            self.file_type_any_of.as_ref().map(Vec::len),
            self.data_type_any_of.as_ref().map(Vec::len),
            self.file_state_any_of.as_ref().map(Vec::len),
            self.archival_status_any_of.as_ref().map(Vec::len),
            self.file_system_type_any_of.as_ref().map(Vec::len),
            self.sender_any_of.as_ref().map(Vec::len),
            self.group_id_any_of.as_ref().map(Vec::len),
            self.global_transit_id_any_of.as_ref().map(Vec::len),
            self.unique_id_any_of.as_ref().map(Vec::len),
        ];
        if lengths
            .into_iter()
            .flatten()
            .any(|len| len > config.max_filter_values)
        {
            return Err(DriveDbError::InvalidArgument(format!(
                "filter value list exceeds {} entries",
                config.max_filter_values
            )));
        }
        Ok(())
    }

    pub(crate) fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            security: self.required_security_group,
            acl_any_of: self.acl_any_of.as_ref().map(to_set),
            tags_any_of: self.tags_any_of.as_ref().map(to_set),
            tags_all_of: self.tags_all_of.clone(),
            file_types: self.file_type_any_of.as_ref().map(to_set),
            data_types: self.data_type_any_of.as_ref().map(to_set),
            file_states: self.file_state_any_of.as_ref().map(to_set),
            archival_statuses: self.archival_status_any_of.as_ref().map(to_set),
            file_system_types: self.file_system_type_any_of.as_ref().map(to_set),
            senders: self
                .sender_any_of
                .as_ref()
                .map(|values| values.iter().cloned().collect()),
            group_ids: self.group_id_any_of.as_ref().map(to_set),
            global_transit_ids: self.global_transit_id_any_of.as_ref().map(to_set),
            unique_ids: self.unique_id_any_of.as_ref().map(to_set),
            user_date_span: self.user_date_span,
        }
    }
}

fn to_set<T: Copy + Eq + std::hash::Hash>(values: &Vec<T>) -> HashSet<T> {
    values.iter().copied().collect()
}

/// The compiled boolean condition of one query.
#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    security: SecurityGroupRange,
    acl_any_of: Option<HashSet<Uuid>>,
    tags_any_of: Option<HashSet<Uuid>>,
    tags_all_of: Option<Vec<Uuid>>,
    file_types: Option<HashSet<i32>>,
    data_types: Option<HashSet<i32>>,
    file_states: Option<HashSet<i32>>,
    archival_statuses: Option<HashSet<i32>>,
    file_system_types: Option<HashSet<i32>>,
    senders: Option<HashSet<CompactString>>,
    group_ids: Option<HashSet<Uuid>>,
    global_transit_ids: Option<HashSet<Uuid>>,
    unique_ids: Option<HashSet<Uuid>>,
    user_date_span: Option<UserDateSpan>,
}

impl CompiledFilter {
    /// Evaluates the combined condition for one row.
    ///
    /// The security/ACL term reproduces the reference composition exactly:
    /// the security-group range always gates, and when `acl_any_of` is
    /// supplied a row additionally needs either an empty ACL set (open row)
    /// or an overlap with the supplied members. An ACL overlap never
    /// substitutes for a failed security-group match.
    pub(crate) fn matches(
        &self,
        record: &FileRecord,
        acl: Option<&OrdSet<Uuid>>,
        tags: Option<&OrdSet<Uuid>>,
    ) -> bool {
        if !self.security.contains(record.required_security_group) {
            return false;
        }
        if let Some(wanted) = &self.acl_any_of {
            let open = acl.is_none_or(|set| set.is_empty());
            if !open && !acl.is_some_and(|set| set.iter().any(|m| wanted.contains(m))) {
                return false;
            }
        }

        if let Some(wanted) = &self.tags_any_of
            && !tags.is_some_and(|set| set.iter().any(|t| wanted.contains(t)))
        {
            return false;
        }
        if let Some(wanted) = &self.tags_all_of
            && !wanted
                .iter()
                .all(|t| tags.is_some_and(|set| set.contains(t)))
        {
            return false;
        }

        if let Some(set) = &self.file_types
            && !set.contains(&record.file_type)
        {
            return false;
        }
        if let Some(set) = &self.data_types
            && !set.contains(&record.data_type)
        {
            return false;
        }
        if let Some(set) = &self.file_states
            && !set.contains(&record.file_state)
        {
            return false;
        }
        if let Some(set) = &self.archival_statuses
            && !set.contains(&record.archival_status)
        {
            return false;
        }
        if let Some(set) = &self.file_system_types
            && !set.contains(&record.file_system_type)
        {
            return false;
        }
        // NULL never matches a value-set predicate.
        if let Some(set) = &self.senders
            && !record.sender_id.as_ref().is_some_and(|s| set.contains(s))
        {
            return false;
        }
        if let Some(set) = &self.group_ids
            && !record.group_id.is_some_and(|g| set.contains(&g))
        {
            return false;
        }
        if let Some(set) = &self.global_transit_ids
            && !record
                .global_transit_id
                .is_some_and(|id| set.contains(&id))
        {
            return false;
        }
        if let Some(set) = &self.unique_ids
            && !record.unique_id.is_some_and(|id| set.contains(&id))
        {
            return false;
        }
        if let Some(span) = &self.user_date_span
            && !span.contains(record.user_date)
        {
            return false;
        }
        true
    }
}
