#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text argument.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "background",
        action: "generate_background",
    },
    CommandSpec {
        command: "brand",
        action: "set_brand",
    },
    CommandSpec {
        command: "post_edit",
        action: "edit_post_copy",
    },
];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "model",
        action: "create_model",
    },
    CommandSpec {
        command: "background_upload",
        action: "upload_background",
    },
    CommandSpec {
        command: "export",
        action: "export",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "pose",
        action: "select_pose",
    },
    CommandSpec {
        command: "gallery",
        action: "select_gallery",
    },
    CommandSpec {
        command: "video_select",
        action: "select_video",
    },
    CommandSpec {
        command: "video_remove",
        action: "remove_video",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "undo",
        action: "remove_garment",
    },
    CommandSpec {
        command: "next_pose",
        action: "next_pose",
    },
    CommandSpec {
        command: "prev_pose",
        action: "previous_pose",
    },
    CommandSpec {
        command: "background_remove",
        action: "remove_background",
    },
    CommandSpec {
        command: "video_close",
        action: "close_video",
    },
    CommandSpec {
        command: "post",
        action: "generate_post_copy",
    },
    CommandSpec {
        command: "carousel",
        action: "generate_carousel",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "wardrobe",
        action: "list_wardrobe",
    },
    CommandSpec {
        command: "poses",
        action: "list_poses",
    },
    CommandSpec {
        command: "templates",
        action: "list_templates",
    },
    CommandSpec {
        command: "reset",
        action: "reset",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub(crate) const GARMENT_COMMAND: CommandSpec = CommandSpec {
    command: "garment",
    action: "select_garment",
};

pub(crate) const UPLOAD_GARMENT_COMMAND: CommandSpec = CommandSpec {
    command: "upload_garment",
    action: "upload_garment",
};

pub(crate) const VIDEO_COMMAND: CommandSpec = CommandSpec {
    command: "video",
    action: "generate_video",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/model",
    "/garment",
    "/upload_garment",
    "/undo",
    "/pose",
    "/next_pose",
    "/prev_pose",
    "/background",
    "/background_upload",
    "/background_remove",
    "/gallery",
    "/video",
    "/video_close",
    "/video_select",
    "/video_remove",
    "/post",
    "/post_edit",
    "/brand",
    "/carousel",
    "/export",
    "/status",
    "/wardrobe",
    "/poses",
    "/templates",
    "/reset",
    "/help",
];
