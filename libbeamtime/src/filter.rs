use bitvec::prelude::*;
use std::str::FromStr;

use super::error::FilterError;
use super::event::{Attribute, EventData, EventType};

/// Whether the filter bounds themselves pass the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bounds {
    #[default]
    Inclusive,
    Exclusive,
}

/// A range predicate on a single event attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filter {
    pub attribute: Attribute,
    pub start: f64,
    pub end: f64,
    pub bounds: Bounds,
}

impl Filter {
    /// Inclusive filter, start <= value <= end
    pub fn new(attribute: Attribute, start: f64, end: f64) -> Self {
        Self {
            attribute,
            start,
            end,
            bounds: Bounds::Inclusive,
        }
    }

    /// Exclusive filter, start < value < end
    pub fn exclusive(attribute: Attribute, start: f64, end: f64) -> Self {
        Self {
            attribute,
            start,
            end,
            bounds: Bounds::Exclusive,
        }
    }

    pub fn accepts(&self, value: f64) -> bool {
        match self.bounds {
            Bounds::Inclusive => value >= self.start && value <= self.end,
            Bounds::Exclusive => value > self.start && value < self.end,
        }
    }

    fn check(&self, event_type: &EventType) -> Result<(), FilterError> {
        if !event_type.is_valid(&self.attribute) {
            return Err(FilterError::InvalidAttribute(self.attribute, *event_type));
        }
        // Infinite bounds leave one side open, a reversed window selects nothing
        if self.start.is_nan() || self.end.is_nan() {
            return Err(FilterError::InvalidBounds(
                self.attribute,
                self.start,
                self.end,
            ));
        }
        Ok(())
    }
}

impl FromStr for Filter {
    type Err = FilterError;
    /// Parse `attribute:start:end` into an inclusive filter
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries: Vec<&str> = s.split(':').collect();
        if entries.len() != 3 {
            return Err(FilterError::BadFilterString(s.to_string()));
        }
        let attribute: Attribute = entries[0].trim().parse()?;
        let start: f64 = entries[1]
            .trim()
            .parse()
            .map_err(|_| FilterError::BadFilterString(s.to_string()))?;
        let end: f64 = entries[2]
            .trim()
            .parse()
            .map_err(|_| FilterError::BadFilterString(s.to_string()))?;
        Ok(Self::new(attribute, start, end))
    }
}

/// Everything needed to pull a selection of events out of a run
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub event_type: EventType,
    pub attributes: Vec<Attribute>,
    pub filters: Vec<Filter>,
    pub fragment: Option<String>,
}

impl EventQuery {
    pub fn new(event_type: EventType, attributes: &[Attribute]) -> Self {
        Self {
            event_type,
            attributes: attributes.to_vec(),
            filters: vec![],
            fragment: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_fragment(mut self, fragment: &str) -> Self {
        self.fragment = Some(fragment.to_string());
        self
    }

    /// Reject malformed queries. Must be called before any data is read.
    pub fn validate(&self) -> Result<(), FilterError> {
        for attribute in self.attributes.iter() {
            if !self.event_type.is_valid(attribute) {
                return Err(FilterError::InvalidAttribute(*attribute, self.event_type));
            }
        }
        if !self.filters.is_empty() && self.fragment.is_some() {
            return Err(FilterError::FiltersAndFragment);
        }
        for filter in self.filters.iter() {
            filter.check(&self.event_type)?;
        }
        Ok(())
    }

    /// Attributes that have to be read to evaluate the query: the requested ones plus
    /// every filtered one
    pub fn required_attributes(&self, filters: &[Filter]) -> Vec<Attribute> {
        let mut required = self.attributes.clone();
        for filter in filters {
            if !required.contains(&filter.attribute) {
                required.push(filter.attribute);
            }
        }
        required
    }
}

/// Build the logical AND of all filters over the events
pub fn filter_mask(data: &EventData, filters: &[Filter]) -> Result<BitVec, FilterError> {
    let mut mask = bitvec![1; data.len()];
    for filter in filters {
        let column = data.column(&filter.attribute)?;
        for (idx, value) in column.iter().enumerate() {
            if !filter.accepts(*value) {
                mask.set(idx, false);
            }
        }
    }
    Ok(mask)
}

/// Return the events passing all filters. No filters returns the events unchanged.
pub fn apply_filters(data: &EventData, filters: &[Filter]) -> Result<EventData, FilterError> {
    if filters.is_empty() {
        return Ok(data.clone());
    }
    let mask = filter_mask(data, filters)?;
    Ok(data.select(&mask))
}
