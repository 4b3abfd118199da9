use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use sysinfo::System;
use tracing::{debug, info, warn};

use super::GameProcess;

/// A Java process whose command line mentions Minecraft.
pub fn is_minecraft_process(name: &str, cmdline: &str) -> bool {
    name.to_ascii_lowercase().contains("java") && cmdline.to_ascii_lowercase().contains("minecraft")
}

/// Scans the process table with `sysinfo` on every call.
#[derive(Debug, Default)]
pub struct SysinfoGame;

impl SysinfoGame {
    pub fn new() -> Self {
        Self
    }
}

impl GameProcess for SysinfoGame {
    fn is_running(&self) -> bool {
        let mut system = System::new_all();
        system.refresh_all();

        let found = system.processes().values().find(|process| {
            let name = process.name().to_string_lossy();
            let cmdline = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            is_minecraft_process(&name, &cmdline)
        });

        match found {
            Some(process) => {
                debug!("Minecraft process found: pid {}", process.pid());
                true
            }
            None => false,
        }
    }

    fn launch(&self, launcher: &Path) -> bool {
        if !launcher.exists() {
            warn!("Launcher not found at {:?}, not starting it", launcher);
            return false;
        }

        let mut cmd = Command::new(launcher);
        if let Some(dir) = launcher.parent() {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        configure_detached_spawn(&mut cmd);

        match cmd.spawn() {
            Ok(child) => {
                info!("Started launcher {:?} (pid {})", launcher, child.id());
                true
            }
            Err(e) => {
                warn!("Cannot start launcher {:?}: {}", launcher, e);
                false
            }
        }
    }
}

fn configure_detached_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = cmd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_java_running_minecraft() {
        assert!(is_minecraft_process(
            "javaw.exe",
            "javaw -Xmx4G -cp libs net.minecraft.client.main.Main"
        ));
        assert!(is_minecraft_process("java", "java -jar /opt/MineCraft/launcher.jar"));
    }

    #[test]
    fn ignores_other_processes() {
        assert!(!is_minecraft_process("java", "java -jar gradle-wrapper.jar"));
        assert!(!is_minecraft_process("minecraft-launcher", "minecraft-launcher"));
        assert!(!is_minecraft_process("bash", ""));
    }

    #[test]
    fn missing_launcher_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let game = SysinfoGame::new();
        assert!(!game.launch(&tmp.path().join("nope").join("launcher")));
    }
}
