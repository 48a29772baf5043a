use std::{fmt::Write, sync::Arc};

use anyhow::{anyhow, Context};

use crate::{
    commands::FADE_TOGGLE_CURRENT,
    media::{ElementRef, MediaElement, MediaKind},
    memory::{MemoryDocument, MemoryMedia},
    plugin::FadeStop,
    settings_tab::{self, SettingField},
};

const HELP: &str = "\
commands:
  toggle                          fade the current media out or in
  click <media>                   click the fade control of <media>
  play <media> | pause <media>    use the native player controls
  tap <media>                     click the player itself
  container <name>                add a container
  add <container> <audio|video> <name> [controls]
  remove <media>                  remove a media element
  settings                        list settings
  set <key> <value>               change a setting
  status                          show every media element
  load | unload                   attach to / detach from the document
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end for poking at a simulated document.
pub struct Shell {
    doc: Arc<MemoryDocument>,
    plugin: FadeStop,
}

impl Shell {
    pub fn new(doc: Arc<MemoryDocument>, plugin: FadeStop) -> Self {
        Self { doc, plugin }
    }

    pub fn plugin(&self) -> &FadeStop {
        &self.plugin
    }

    pub fn plugin_mut(&mut self) -> &mut FadeStop {
        &mut self.plugin
    }

    /// Runs one input line. Output meant for the user is returned.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<(Flow, String)> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = args.split_first() else {
            return Ok((Flow::Continue, String::new()));
        };

        let output = match (command, rest) {
            ("help", []) => HELP.to_string(),
            ("quit" | "exit", []) => return Ok((Flow::Quit, String::new())),
            ("toggle", []) => match self.plugin.run_command(FADE_TOGGLE_CURRENT.id) {
                Ok(()) => String::new(),
                Err(err) => err.to_string(),
            },
            ("click", [name]) => {
                let media = self.media(name)?;
                let control = self
                    .doc
                    .controls_for(&media)
                    .first()
                    .map(|control| control.id)
                    .ok_or_else(|| anyhow!("`{name}` has no fade control"))?;
                self.doc.click_control(control);
                String::new()
            }
            ("play", [name]) => {
                if let Err(err) = self.media(name)?.play() {
                    format!("play failed: {err}")
                } else {
                    String::new()
                }
            }
            ("pause", [name]) => {
                self.media(name)?.pause()?;
                String::new()
            }
            ("tap", [name]) => {
                self.media(name)?.user_click();
                String::new()
            }
            ("container", [name]) => {
                if self.doc.container_named(name).is_some() {
                    return Err(anyhow!("container `{name}` already exists"));
                }
                self.doc.add_container(*name);
                String::new()
            }
            ("add", [container, kind, name, flags @ ..]) => {
                self.add(container, kind, name, flags)?;
                String::new()
            }
            ("remove", [name]) => {
                let media = self.media(name)?;
                self.doc.remove_media(&media);
                String::new()
            }
            ("settings", []) => self.describe_settings(),
            ("set", [key, value]) => {
                let field = SettingField::from_key(key)
                    .ok_or_else(|| anyhow!("unknown setting `{key}`"))?;
                if settings_tab::change(&mut self.plugin, field, value) {
                    String::new()
                } else {
                    format!(
                        "invalid value for {key}; kept {}",
                        field.current(self.plugin.settings())
                    )
                }
            }
            ("status", []) => self.status(),
            ("load", []) => {
                self.plugin.load();
                String::new()
            }
            ("unload", []) => {
                self.plugin.unload();
                String::new()
            }
            _ => return Err(anyhow!("cannot parse `{line}`; try `help`")),
        };
        Ok((Flow::Continue, output))
    }

    fn media(&self, name: &str) -> anyhow::Result<Arc<MemoryMedia>> {
        self.doc
            .find_media(name)
            .with_context(|| format!("no media element named `{name}`"))
    }

    fn add(&self, container: &str, kind: &str, name: &str, flags: &[&str]) -> anyhow::Result<()> {
        let id = self
            .doc
            .container_named(container)
            .with_context(|| format!("no container named `{container}`"))?;
        let kind = match kind {
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            other => return Err(anyhow!("unknown media kind `{other}`")),
        };
        if self.doc.find_media(name).is_some() {
            return Err(anyhow!("media element `{name}` already exists"));
        }
        let controls = match flags {
            [] => false,
            ["controls"] => true,
            other => return Err(anyhow!("unexpected arguments {other:?}")),
        };
        let media = MemoryMedia::new(name, kind).with_controls(controls);
        self.doc.insert_media(id, media);
        Ok(())
    }

    fn describe_settings(&self) -> String {
        let settings = self.plugin.settings();
        let mut out = String::new();
        for field in SettingField::ALL {
            let _ = writeln!(
                out,
                "{} = {}\n    {}: {}",
                field.key(),
                field.current(settings),
                field.name(),
                field.description()
            );
        }
        out.trim_end().to_string()
    }

    fn status(&self) -> String {
        let mut out = String::new();
        for media in self.doc.all_media() {
            let element: ElementRef = media.clone();
            let state = self.plugin.fade_state(&element);
            let _ = writeln!(
                out,
                "{:<16} vol {:.2} {:<7} {:<8} controls {}{}",
                media.name(),
                media.volume(),
                if media.is_paused() { "paused" } else { "playing" },
                if state.faded { "faded" } else { "audible" },
                self.doc.controls_for(&media).len(),
                if self.plugin.is_animating(&element) {
                    " (fading)"
                } else {
                    ""
                },
            );
        }
        if out.is_empty() {
            out.push_str("no media elements");
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::MemoryStore, frame::ManualClock};

    fn shell() -> (Shell, ManualClock) {
        let doc = Arc::new(MemoryDocument::new());
        let clock = ManualClock::new();
        let mut plugin = FadeStop::new(
            doc.clone(),
            Box::new(MemoryStore::with_value(json!({ "fadeSeconds": 0.1 }))),
        )
        .with_clock(clock.clone());
        plugin.load();
        (Shell::new(doc, plugin), clock)
    }

    fn run(shell: &mut Shell, line: &str) -> String {
        let (flow, output) = shell.exec(line).unwrap();
        assert_eq!(flow, Flow::Continue);
        output
    }

    #[test]
    fn should_fade_media_added_from_the_shell() {
        // given
        let (mut shell, clock) = shell();
        run(&mut shell, "container notes");
        run(&mut shell, "add notes audio intro controls");
        run(&mut shell, "play intro");
        shell.plugin_mut().tick();

        // when
        run(&mut shell, "click intro");
        for _ in 0..10 {
            clock.advance(std::time::Duration::from_millis(16));
            shell.plugin_mut().tick();
        }

        // then
        let status = run(&mut shell, "status");
        assert!(status.contains("intro"));
        assert!(status.contains("paused"));
        assert!(status.contains("faded"));
    }

    #[test]
    fn should_report_missing_target() {
        // given
        let (mut shell, _) = shell();

        // when
        let output = run(&mut shell, "toggle");

        // then
        assert_eq!(output, "No media element found.");
    }

    #[test]
    fn should_reject_invalid_setting_values() {
        // given
        let (mut shell, _) = shell();

        // when
        let output = run(&mut shell, "set fadeSeconds nope");

        // then
        assert_eq!(output, "invalid value for fadeSeconds; kept 0.1");
        assert!(shell.exec("set bogus 1").is_err());
    }

    #[test]
    fn should_quit() {
        // given
        let (mut shell, _) = shell();

        // then
        assert_eq!(shell.exec("quit").unwrap().0, Flow::Quit);
        assert!(shell.exec("frobnicate").is_err());
    }
}
