pub mod npc;
pub mod npc_registry;
pub mod player_registry;
pub mod settings;
pub mod skin;
pub mod tick_loop;
pub mod transport;
pub mod visibility;
