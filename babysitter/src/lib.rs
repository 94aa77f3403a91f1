// Process registry module
pub mod registry;

// Plan runner module
pub mod runtime;

// Agent dispatch module
pub mod dispatch;

// Run journal module
pub mod journal;

// Prompt utilities module
pub mod prompt;

// Approval gate module
pub mod gate;

// Built-in process definitions
pub mod processes;
