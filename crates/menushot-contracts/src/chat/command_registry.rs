#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text argument.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "restaurant",
    action: "search_context",
}];

/// Commands taking a list of dish names.
pub(crate) const LIST_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "dishes",
        action: "select_dishes",
    },
    CommandSpec {
        command: "dish",
        action: "select_dishes",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "ocr",
        action: "menu_image",
    },
    CommandSpec {
        command: "menu",
        action: "menu_text_file",
    },
    CommandSpec {
        command: "export",
        action: "export",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "paste",
        action: "paste_menu",
    },
    CommandSpec {
        command: "skip",
        action: "skip_context",
    },
    CommandSpec {
        command: "accept",
        action: "accept_context",
    },
    CommandSpec {
        command: "reject",
        action: "reject_context",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "dismiss",
        action: "dismiss_error",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const WIZARD_HELP_COMMANDS: &[&str] = &[
    "/ocr <image>",
    "/menu <text file>",
    "/paste",
    "/dishes <a; b; c>",
    "/restaurant <name>",
    "/skip",
    "/accept",
    "/reject",
    "/status",
    "/dismiss",
    "/reset",
    "/export [file]",
    "/help",
    "/quit",
];
