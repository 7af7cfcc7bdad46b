// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

pub mod cache;
pub mod client;
pub mod logging;
pub mod parser;
pub mod rate_limit;
pub mod upstream;
