// ─── craftsync Core ───
// World save backup and restore against a cloud folder.
//
// Architecture:
//   core/
//     storage/    Remote store trait, Drive client, in-memory store, retries
//     archive     World directory <-> zip
//     saves/      Local save tree (vanilla worlds, modpack instances)
//     identity    Machine marker deciding whether a restore runs
//     sync/       Upload and restore passes
//     lifecycle/  Game process detection and launcher spawn
//     status      {step, status} progress lines
//     session     Full run orchestration
//     config      OS defaults, settings file, CLI overrides

pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod saves;
pub mod session;
pub mod status;
pub mod storage;
pub mod sync;
