//! Static reference data: regions, Mythic+ seasons and their dungeon pools,
//! classes and specializations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Game region.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Region {
  #[default]
  Us,
  Eu,
  Kr,
  Tw,
  Cn,
}

impl Region {
  pub const ALL: [Region; 5] = [Region::Us, Region::Eu, Region::Kr, Region::Tw, Region::Cn];

  pub fn slug(&self) -> &'static str {
    match self {
      Region::Us => "us",
      Region::Eu => "eu",
      Region::Kr => "kr",
      Region::Tw => "tw",
      Region::Cn => "cn",
    }
  }
}

impl fmt::Display for Region {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

impl FromStr for Region {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    Region::ALL
      .into_iter()
      .find(|r| r.slug() == lower)
      .ok_or_else(|| format!("unknown region: {}", s))
  }
}

/// A Mythic+ dungeon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dungeon {
  pub slug: &'static str,
  pub name: &'static str,
  pub short_name: &'static str,
}

/// A Mythic+ season and its dungeon pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Season {
  pub slug: &'static str,
  pub name: &'static str,
  pub expansion: &'static str,
  pub dungeons: &'static [Dungeon],
}

impl Season {
  pub fn has_dungeon(&self, slug: &str) -> bool {
    self.dungeons.iter().any(|d| d.slug == slug)
  }

  pub fn dungeon(&self, slug: &str) -> Option<&'static Dungeon> {
    self.dungeons.iter().find(|d| d.slug == slug)
  }
}

const ARA_KARA: Dungeon = Dungeon {
  slug: "ara-kara-city-of-echoes",
  name: "Ara-Kara, City of Echoes",
  short_name: "ARAK",
};
const DAWNBREAKER: Dungeon = Dungeon {
  slug: "the-dawnbreaker",
  name: "The Dawnbreaker",
  short_name: "DAWN",
};
const FLOODGATE: Dungeon = Dungeon {
  slug: "operation-floodgate",
  name: "Operation: Floodgate",
  short_name: "FLOOD",
};
const PRIORY: Dungeon = Dungeon {
  slug: "priory-of-the-sacred-flame",
  name: "Priory of the Sacred Flame",
  short_name: "PSF",
};

/// Known seasons, oldest first.
pub const SEASONS: &[Season] = &[
  Season {
    slug: "season-tww-1",
    name: "TWW Season 1",
    expansion: "The War Within",
    dungeons: &[
      ARA_KARA,
      Dungeon {
        slug: "city-of-threads",
        name: "City of Threads",
        short_name: "COT",
      },
      Dungeon {
        slug: "grim-batol",
        name: "Grim Batol",
        short_name: "GB",
      },
      Dungeon {
        slug: "mists-of-tirna-scithe",
        name: "Mists of Tirna Scithe",
        short_name: "MISTS",
      },
      Dungeon {
        slug: "siege-of-boralus",
        name: "Siege of Boralus",
        short_name: "SIEGE",
      },
      DAWNBREAKER,
      Dungeon {
        slug: "the-necrotic-wake",
        name: "The Necrotic Wake",
        short_name: "NW",
      },
      Dungeon {
        slug: "the-stonevault",
        name: "The Stonevault",
        short_name: "SV",
      },
    ],
  },
  Season {
    slug: "season-tww-2",
    name: "TWW Season 2",
    expansion: "The War Within",
    dungeons: &[
      Dungeon {
        slug: "cinderbrew-meadery",
        name: "Cinderbrew Meadery",
        short_name: "BREW",
      },
      Dungeon {
        slug: "darkflame-cleft",
        name: "Darkflame Cleft",
        short_name: "DFC",
      },
      Dungeon {
        slug: "mechagon-workshop",
        name: "Operation: Mechagon - Workshop",
        short_name: "WORK",
      },
      FLOODGATE,
      PRIORY,
      Dungeon {
        slug: "the-motherlode",
        name: "The MOTHERLODE!!",
        short_name: "ML",
      },
      Dungeon {
        slug: "the-rookery",
        name: "The Rookery",
        short_name: "ROOK",
      },
      Dungeon {
        slug: "theater-of-pain",
        name: "Theater of Pain",
        short_name: "TOP",
      },
    ],
  },
  Season {
    slug: "season-tww-3",
    name: "TWW Season 3",
    expansion: "The War Within",
    dungeons: &[
      ARA_KARA,
      Dungeon {
        slug: "ecodome-aldani",
        name: "Eco-Dome Al'dani",
        short_name: "EDA",
      },
      Dungeon {
        slug: "halls-of-atonement",
        name: "Halls of Atonement",
        short_name: "HOA",
      },
      FLOODGATE,
      PRIORY,
      Dungeon {
        slug: "tazavesh-soleahs-gambit",
        name: "Tazavesh: So'leah's Gambit",
        short_name: "GMBT",
      },
      Dungeon {
        slug: "tazavesh-streets-of-wonder",
        name: "Tazavesh: Streets of Wonder",
        short_name: "STRT",
      },
      DAWNBREAKER,
    ],
  },
];

/// Look up a season by slug.
pub fn find_season(slug: &str) -> Option<&'static Season> {
  SEASONS.iter().find(|s| s.slug == slug)
}

/// The most recent known season.
pub fn current_season() -> &'static Season {
  // SEASONS is a non-empty constant
  &SEASONS[SEASONS.len() - 1]
}

/// A playable class and its specializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Class {
  pub slug: &'static str,
  pub name: &'static str,
  pub specs: &'static [&'static str],
}

pub const CLASSES: &[Class] = &[
  Class {
    slug: "death-knight",
    name: "Death Knight",
    specs: &["blood", "frost", "unholy"],
  },
  Class {
    slug: "demon-hunter",
    name: "Demon Hunter",
    specs: &["havoc", "vengeance"],
  },
  Class {
    slug: "druid",
    name: "Druid",
    specs: &["balance", "feral", "guardian", "restoration"],
  },
  Class {
    slug: "evoker",
    name: "Evoker",
    specs: &["augmentation", "devastation", "preservation"],
  },
  Class {
    slug: "hunter",
    name: "Hunter",
    specs: &["beast-mastery", "marksmanship", "survival"],
  },
  Class {
    slug: "mage",
    name: "Mage",
    specs: &["arcane", "fire", "frost"],
  },
  Class {
    slug: "monk",
    name: "Monk",
    specs: &["brewmaster", "mistweaver", "windwalker"],
  },
  Class {
    slug: "paladin",
    name: "Paladin",
    specs: &["holy", "protection", "retribution"],
  },
  Class {
    slug: "priest",
    name: "Priest",
    specs: &["discipline", "holy", "shadow"],
  },
  Class {
    slug: "rogue",
    name: "Rogue",
    specs: &["assassination", "outlaw", "subtlety"],
  },
  Class {
    slug: "shaman",
    name: "Shaman",
    specs: &["elemental", "enhancement", "restoration"],
  },
  Class {
    slug: "warlock",
    name: "Warlock",
    specs: &["affliction", "demonology", "destruction"],
  },
  Class {
    slug: "warrior",
    name: "Warrior",
    specs: &["arms", "fury", "protection"],
  },
];

/// Look up a class by slug.
pub fn find_class(slug: &str) -> Option<&'static Class> {
  CLASSES.iter().find(|c| c.slug == slug)
}
