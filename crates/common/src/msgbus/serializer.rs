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

use std::any::Any;

use bytes::Bytes;
use ustr::Ustr;

/// The universe of message type names the platform will forward to an
/// external sink.
///
/// A bus instance publishes the subset remaining after its configured
/// `types_filter` has been removed.
pub const EXTERNAL_PUBLISHING_TYPES: &[&str] = &[
    "QuoteTick",
    "TradeTick",
    "Bar",
    "MarkPriceUpdate",
    "IndexPriceUpdate",
    "InstrumentStatus",
    "InstrumentClose",
];

/// A facade over payload serialization for external publishing.
///
/// Implementations know the platform's concrete message types; the bus only
/// asks for a registered type name (to apply the publishable-types filter)
/// and for the serialized bytes.
pub trait MessageSerializer {
    /// Returns the registered type name for the `message`, or `None` when the
    /// concrete type is unknown to this serializer.
    fn type_name(&self, message: &dyn Any) -> Option<Ustr>;

    /// Serializes the `message` to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded.
    fn serialize(&self, message: &dyn Any) -> anyhow::Result<Bytes>;
}
