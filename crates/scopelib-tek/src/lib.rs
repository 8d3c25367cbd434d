//! Tektronix oscilloscope models for scopelib.
//!
//! Tektronix instruments differ from each other only in data: command
//! templates, keyword lists, the waveform preamble layout and the
//! horizontal-scale table. This crate provides that data as
//! [`ScopeModel`](scopelib_core::ScopeModel) values to hand to
//! `scopelib_engine::ScopeBuilder`.
//!
//! | Model    | Record | Preamble  | Coupling        |
//! |----------|--------|-----------|-----------------|
//! | MDO3000  | 1000   | 22 fields | DC, AC, DCREJ   |
//! | TDS3000  | 500    | 16 fields | DC, AC, GND     |

pub mod models;

pub use models::{all_tek_models, mdo3000, model_by_name, tds3000};
