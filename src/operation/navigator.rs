// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Read-only lookups over a `Parameters` tree

use crate::model::{Extension, Parameter};

/// First node named `name`. Matching is case-sensitive.
pub fn find_first<'a>(tree: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    tree.iter().find(|node| node.name == name)
}

pub fn find_all<'a>(tree: &'a [Parameter], name: &str) -> Vec<&'a Parameter> {
    tree.iter().filter(|node| node.name == name).collect()
}

pub fn parts_of(node: &Parameter) -> &[Parameter] {
    &node.part
}

/// Extensions of `node`, optionally only those whose URL contains `url_token`
pub fn extensions_of<'a>(node: &'a Parameter, url_token: Option<&str>) -> Vec<&'a Extension> {
    node.extension
        .iter()
        .filter(|ext| url_token.is_none_or(|token| ext.url.contains(token)))
        .collect()
}

/// String value of the first node named `name`
pub fn find_string<'a>(tree: &'a [Parameter], name: &str) -> Option<&'a str> {
    find_first(tree, name).and_then(Parameter::value_str)
}
