//! Typed - 型付きイベント API
//!
//! event kind の typo を型で排除します。文字列で渡す `track_named` は
//! 実行時に allow-list で検証されますが、こちらは静的に決まります。

pub mod event;

pub use self::event::{
    AddToCart, BeginCheckout, CampaignView, CtaClick, ExitPage, PageView, Purchase, ScrollDepth,
    TimeOnPage, TrackedEvent, ViewProduct,
};
