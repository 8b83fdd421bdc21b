mod helpers;
mod incremental;
mod resume;
