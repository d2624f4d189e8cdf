// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2018-2026 Meridian Systems Pty Ltd. All rights reserved.
//  https://meridian.systems
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

use smallvec::SmallVec;

use super::core::{MStr, Pattern, Topic};

/// Returns whether the concrete `topic` is matched by the wildcard `pattern`.
///
/// Pattern semantics:
/// - `*` matches zero or more characters.
/// - `?` matches exactly one character.
/// - Every other character matches itself; comparison is byte-exact.
///
/// The pattern language is flat: separators such as `.` receive no special
/// treatment.
#[must_use]
pub fn is_matching(topic: MStr<Topic>, pattern: MStr<Pattern>) -> bool {
    is_matching_bytes(topic.as_bytes(), pattern.as_bytes())
}

/// Matches raw `topic` bytes against raw `pattern` bytes.
///
/// Dynamic programming over the pattern, collapsed to a single row of
/// `pattern.len() + 1` cells with a backup cell carrying the diagonal.
/// The row lives on the stack for all but unusually long patterns.
#[must_use]
pub fn is_matching_bytes(topic: &[u8], pattern: &[u8]) -> bool {
    // row[j]: whether the topic prefix consumed so far is matched by pattern[..j]
    let mut row: SmallVec<[bool; 128]> = SmallVec::with_capacity(pattern.len() + 1);
    row.push(true);
    for (j, &p) in pattern.iter().enumerate() {
        let empty_prefix_matched = row[j];
        row.push(empty_prefix_matched && p == b'*');
    }

    for &t in topic {
        let mut diag = row[0];
        row[0] = false;
        for (j, &p) in pattern.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = match p {
                b'*' => above || row[j],
                b'?' => diag,
                _ => diag && t == p,
            };
            diag = above;
        }
    }

    row[pattern.len()]
}
