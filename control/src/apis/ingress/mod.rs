//! Ingress support (networking.k8s.io/v1)
//!
//! - ingress: conversion of `Ingress` objects into `RoutingResource`s and key handling
//! - mirror: local, eventually-consistent copy of all Ingresses plus the watch loop

#[allow(clippy::module_inception)]
pub mod ingress;
pub mod mirror;
