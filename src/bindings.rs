// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Defines managed resource types and the types used to describe and access them */

pub mod buffer_access;
pub mod coordinates;
pub mod dirty_tracking;
pub mod managed;
pub(crate) mod resource_tracking;
pub mod texture_builder;
pub mod visible_to;
