//! # ical-engine
//!
//! Read the events of an iCalendar resource that fall inside a time window,
//! with recurring events expanded into their concrete instances.
//!
//! ```no_run
//! use chrono::TimeZone;
//! use chrono_tz::Asia::Omsk;
//!
//! let after = Omsk.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
//! let before = Omsk.with_ymd_and_hms(2017, 1, 6, 0, 0, 0).unwrap();
//! let events = ical_engine::read_events("calendar.ics", after, before).unwrap();
//! for event in events {
//!     println!("{} {}", event.start, event.title);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`lexer`]: raw bytes → unfolded content lines, TEXT unescaping
//! - [`component`]: BEGIN/END nesting
//! - [`value`]: DATE, DATE-TIME, DURATION, UTC-OFFSET values
//! - [`rule`]: RRULE parsing
//! - [`timezone`]: VTIMEZONE definitions and zone resolution
//! - [`dst`]: DST gap policy
//! - [`document`]: calendar documents and event records
//! - [`expander`]: lazy RRULE/RDATE/EXDATE expansion
//! - [`filter`]: half-open interval filtering
//! - [`event`]: output events
//! - [`source`]: file and HTTP retrieval
//! - [`reader`]: the end-to-end read
//! - [`config`]: reader configuration
//! - [`error`]: error types

pub mod component;
pub mod config;
pub mod document;
pub mod dst;
pub mod error;
pub mod event;
pub mod expander;
pub mod filter;
pub mod lexer;
pub mod reader;
pub mod rule;
pub mod source;
pub mod timezone;
pub mod value;

pub use config::{InvalidEventPolicy, ReaderConfig, ZonePolicy};
pub use document::{CalendarDocument, EventRecord};
pub use dst::DstPolicy;
pub use error::{ReadError, Result};
pub use event::Event;
pub use expander::{expand, Occurrences};
pub use filter::{filter, Interval, Occurrence};
pub use reader::{calendar_events, read_events, CalendarEvents, CalendarReader};
pub use source::{AnySource, FileSource, HttpSource, SourceReader};
