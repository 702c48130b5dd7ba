//! Per-kind schemas, dispatched explicitly through one tagged enum.

use bnd_core::{DataKind, FileManifest};

use crate::behavior::BehaviorSchema;
use crate::ephys::EphysSchema;
use crate::error::ValidationError;
use crate::extra::ExtraSchema;
use crate::report::Warning;
use crate::session::SessionContext;
use crate::video::VideoSchema;

/// One data kind's structural check.
pub trait Validator {
    /// Check the session against this schema and return its manifest.
    /// Policy warnings are appended to `warnings`.
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Behavioral(BehaviorSchema),
    Ephys(EphysSchema),
    Video(VideoSchema),
    Extra(ExtraSchema),
}

impl Schema {
    pub fn for_kind(kind: DataKind) -> Self {
        match kind {
            DataKind::Behavior => Schema::Behavioral(BehaviorSchema),
            DataKind::Ephys => Schema::Ephys(EphysSchema),
            DataKind::Video => Schema::Video(VideoSchema),
            DataKind::Extra => Schema::Extra(ExtraSchema),
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Schema::Behavioral(_) => DataKind::Behavior,
            Schema::Ephys(_) => DataKind::Ephys,
            Schema::Video(_) => DataKind::Video,
            Schema::Extra(_) => DataKind::Extra,
        }
    }
}

impl Validator for Schema {
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError> {
        match self {
            Schema::Behavioral(s) => s.validate(ctx, warnings),
            Schema::Ephys(s) => s.validate(ctx, warnings),
            Schema::Video(s) => s.validate(ctx, warnings),
            Schema::Extra(s) => s.validate(ctx, warnings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_kind_roundtrips_through_kind() {
        for kind in [
            DataKind::Behavior,
            DataKind::Ephys,
            DataKind::Video,
            DataKind::Extra,
        ] {
            assert_eq!(Schema::for_kind(kind).kind(), kind);
        }
    }
}
