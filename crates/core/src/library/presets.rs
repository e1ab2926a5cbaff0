use serde::Serialize;

/// Built-in rhythm shipped with the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub bpm: u32,
    /// Asset location, relative to the asset root or base URL.
    pub path: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "Arrocha",
        bpm: 134,
        path: "sounds/arrocha134.mp3",
    },
    Preset {
        name: "Axé",
        bpm: 100,
        path: "sounds/axe100.mp3",
    },
    Preset {
        name: "Baião",
        bpm: 95,
        path: "sounds/baiao95.mp3",
    },
    Preset {
        name: "Bolero",
        bpm: 110,
        path: "sounds/bolero110.mp3",
    },
    Preset {
        name: "Guarania",
        bpm: 110,
        path: "sounds/guarania110.mp3",
    },
    Preset {
        name: "Marchinha de Carnaval",
        bpm: 130,
        path: "sounds/marchinha130.mp3",
    },
    Preset {
        name: "Pagode Anos 90",
        bpm: 90,
        path: "sounds/pagode90.mp3",
    },
    Preset {
        name: "Rancheira Valsa",
        bpm: 84,
        path: "sounds/rancheira84.mp3",
    },
    Preset {
        name: "Reggae",
        bpm: 160,
        path: "sounds/reggae160.mp3",
    },
    Preset {
        name: "Rock",
        bpm: 140,
        path: "sounds/rock140.mp3",
    },
    Preset {
        name: "Samba",
        bpm: 70,
        path: "sounds/samba70.mp3",
    },
    Preset {
        name: "Vaneira",
        bpm: 90,
        path: "sounds/vaneira90.mp3",
    },
    Preset {
        name: "Xote",
        bpm: 90,
        path: "sounds/xote90.mp3",
    },
];

pub fn preset(index: usize) -> Option<&'static Preset> {
    PRESETS.get(index)
}
