// Copyright 2025 dentsusoken
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

use std::fmt;
use std::path::Path;

/// Prefix separating this crate's objects from unrelated names in the OS namespace.
pub const IDENTITY_PREFIX: &str = "pathmutex";

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Name of the synchronization object guarding a path.
///
/// The path is treated as an opaque string: nothing is canonicalized and the
/// target is never touched, so `cache/x.lock` and `/abs/cache/x.lock` map to
/// different identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockIdentity(String);

impl LockIdentity {
    pub fn resolve(path: &str) -> Self {
        let mut name = String::with_capacity(IDENTITY_PREFIX.len() + 1 + path.len());
        name.push_str(IDENTITY_PREFIX);
        name.push('_');
        name.extend(
            path.chars()
                .map(|c| if SEPARATORS.contains(&c) { '_' } else { c }),
        );
        Self(name)
    }

    /// Resolves a filesystem path, replacing non UTF-8 sequences.
    pub fn from_path(path: &Path) -> Self {
        Self::resolve(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_deterministic() {
        let path = "/var/cache/packages/x.lock";
        assert_eq!(LockIdentity::resolve(path), LockIdentity::resolve(path));
        assert_eq!(
            LockIdentity::resolve(path).as_str(),
            "pathmutex__var_cache_packages_x.lock"
        );
    }

    #[test]
    fn separator_styles_normalize_to_same_identity() {
        let unix = LockIdentity::resolve("C:/cache/x.lock");
        let windows = LockIdentity::resolve("C:\\cache\\x.lock");
        assert_eq!(unix, windows);
        assert_eq!(unix.as_str(), "pathmutex_C:_cache_x.lock");
    }

    #[test]
    fn result_contains_no_separators() {
        let identity = LockIdentity::resolve("a/b\\c//d");
        assert!(!identity.as_str().contains(['/', '\\']));
    }

    #[test]
    fn other_characters_are_not_escaped() {
        let identity = LockIdentity::resolve("spaces and ü:*?.lock");
        assert_eq!(identity.as_str(), "pathmutex_spaces and ü:*?.lock");
    }

    #[test]
    fn empty_path_is_accepted() {
        assert_eq!(LockIdentity::resolve("").as_str(), "pathmutex_");
    }

    #[test]
    fn relative_and_absolute_paths_differ() {
        assert_ne!(
            LockIdentity::resolve("cache/x.lock"),
            LockIdentity::resolve("/cache/x.lock")
        );
    }

    #[test]
    fn from_path_matches_string_resolution() {
        let path = Path::new("/tmp/cache.lock");
        assert_eq!(
            LockIdentity::from_path(path),
            LockIdentity::resolve("/tmp/cache.lock")
        );
    }
}
