//! The fixed set of scripts this bot can run. Each script is a plain
//! function consuming the run context; all of its writes go through
//! `edit::perform_edit`.

use crate::dispatch::ScriptDescriptor;

pub mod testscript;

/// Registered scripts, alphabetical by name. `dispatch::list_scripts`
/// relies on this ordering for stable help output.
pub(crate) const REGISTRY: &[ScriptDescriptor] = &[ScriptDescriptor {
    name: "testscript",
    about: "Append pseudo-random digits to the sandbox page (end-to-end exercise)",
    entry: testscript::script_main,
}];
